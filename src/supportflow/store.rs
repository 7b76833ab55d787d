//! Key/value JSON persistence collaborator.
//!
//! The engine treats persistence as an external collaborator with a fixed
//! operation surface: catalog/customer/order reads, knowledge-base and FAQ
//! search, and write paths for purchases, measurements, billing, delivery,
//! and alteration requests. Storage is sectioned JSON persisted as one
//! document under the data directory, with read-after-write semantics
//! inside the process and best-effort durability on each write;
//! [`SupportStore::in_memory`] skips the file entirely, which is what the
//! tests use.
//!
//! The store ships seeded with a small demo dataset (two customers, a
//! gendered shirt inventory plus electronics, two orders, FAQ and knowledge
//! base entries, a 30-day return policy) so a fresh process can serve every
//! bundled tool immediately.

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::sync::RwLock;
use uuid::Uuid;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug)]
pub enum StoreError {
    NotFound(String),
    Io(std::io::Error),
    Serde(serde_json::Error),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::NotFound(what) => write!(f, "not found: {}", what),
            StoreError::Io(e) => write!(f, "store io error: {}", e),
            StoreError::Serde(e) => write!(f, "store serialization error: {}", e),
        }
    }
}

impl Error for StoreError {}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        StoreError::Io(e)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serde(e)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    pub name: String,
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    pub price: f64,
    #[serde(default)]
    pub colors: Vec<String>,
    #[serde(default)]
    pub sizes: Vec<String>,
    #[serde(default)]
    pub details: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Customer {
    pub id: String,
    pub name: String,
    pub email: String,
    pub tier: String,
    #[serde(default)]
    pub preferences: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderItem {
    pub product_id: String,
    pub quantity: u32,
    pub price: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub order_id: String,
    pub customer_id: String,
    pub status: String,
    /// ISO date of purchase.
    pub order_date: String,
    pub items: Vec<OrderItem>,
    pub total: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracking: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery_date: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurchaseItem {
    pub product_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    pub price: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Purchase {
    pub purchase_id: String,
    pub customer_id: String,
    pub items: Vec<PurchaseItem>,
    pub status: String,
    pub total: f64,
    pub created_at: String,
    /// Billing/delivery/alteration updates land here.
    #[serde(default)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Sections {
    catalog: HashMap<String, Product>,
    customers: HashMap<String, Customer>,
    orders: HashMap<String, Order>,
    purchases: HashMap<String, Purchase>,
    /// Keyed `customer_id:gender`.
    measurements: HashMap<String, Value>,
    /// Keyed by purchase id.
    billing: HashMap<String, Value>,
    deliveries: HashMap<String, Value>,
    alterations: HashMap<String, Value>,
    knowledge_base: Vec<Value>,
    faq: Vec<Value>,
    return_policy: Value,
}

/// The persistence collaborator.
pub struct SupportStore {
    sections: RwLock<Sections>,
    data_dir: Option<PathBuf>,
}

impl SupportStore {
    /// Seeded store with no file backing.
    pub fn in_memory() -> Self {
        Self {
            sections: RwLock::new(seed_sections()),
            data_dir: None,
        }
    }

    /// Open a file-backed store under `dir`, loading any existing section
    /// files and seeding the rest.
    pub fn open(dir: impl Into<PathBuf>) -> StoreResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        let path = dir.join("sections.json");
        let sections = if path.exists() {
            serde_json::from_str(&fs::read_to_string(&path)?)?
        } else {
            seed_sections()
        };
        let store = Self {
            sections: RwLock::new(sections),
            data_dir: Some(dir),
        };
        store.persist();
        Ok(store)
    }

    /// Best-effort write-through; failures are logged and do not surface to
    /// callers.
    fn persist(&self) {
        let dir = match &self.data_dir {
            Some(dir) => dir.clone(),
            None => return,
        };
        let snapshot = match self.sections.read() {
            Ok(sections) => sections.clone(),
            Err(_) => return,
        };
        let result = serde_json::to_string_pretty(&snapshot)
            .map_err(StoreError::from)
            .and_then(|body| fs::write(dir.join("sections.json"), body).map_err(StoreError::from));
        if let Err(e) = result {
            log::warn!("store persistence failed: {}", e);
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Sections> {
        self.sections.read().unwrap_or_else(|poison| poison.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Sections> {
        self.sections.write().unwrap_or_else(|poison| poison.into_inner())
    }

    // ---- catalog ----

    pub fn get_catalog(&self) -> Vec<Product> {
        let mut products: Vec<Product> = self.read().catalog.values().cloned().collect();
        products.sort_by(|a, b| a.id.cmp(&b.id));
        products
    }

    pub fn get_product(&self, id: &str) -> StoreResult<Product> {
        self.read()
            .catalog
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("product {}", id)))
    }

    pub fn search_products(&self, gender: Option<&str>, category: Option<&str>) -> Vec<Product> {
        let mut products: Vec<Product> = self
            .read()
            .catalog
            .values()
            .filter(|p| gender.map(|g| p.gender.as_deref() == Some(g)).unwrap_or(true))
            .filter(|p| category.map(|c| p.category.eq_ignore_ascii_case(c)).unwrap_or(true))
            .cloned()
            .collect();
        products.sort_by(|a, b| a.id.cmp(&b.id));
        products
    }

    // ---- customers ----

    pub fn get_customer(&self, id: &str) -> StoreResult<Customer> {
        self.read()
            .customers
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("customer {}", id)))
    }

    pub fn get_customers(&self) -> Vec<Customer> {
        let mut customers: Vec<Customer> = self.read().customers.values().cloned().collect();
        customers.sort_by(|a, b| a.id.cmp(&b.id));
        customers
    }

    // ---- orders ----

    pub fn get_order(&self, id: &str) -> StoreResult<Order> {
        self.read()
            .orders
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("order {}", id)))
    }

    pub fn get_customer_orders(&self, customer_id: &str) -> Vec<Order> {
        let mut orders: Vec<Order> = self
            .read()
            .orders
            .values()
            .filter(|o| o.customer_id == customer_id)
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.order_date.cmp(&a.order_date));
        orders
    }

    // ---- knowledge ----

    pub fn search_knowledge_base(&self, query: &str) -> Vec<Value> {
        search_entries(&self.read().knowledge_base, query)
    }

    pub fn search_faq(&self, query: &str) -> Vec<Value> {
        search_entries(&self.read().faq, query)
    }

    pub fn get_return_policy(&self) -> Value {
        self.read().return_policy.clone()
    }

    // ---- purchases ----

    pub fn create_purchase(&self, customer_id: &str, items: Vec<PurchaseItem>) -> Purchase {
        let total = items.iter().map(|i| i.price).sum();
        let purchase = Purchase {
            purchase_id: format!("PUR-{}", Uuid::new_v4().simple()),
            customer_id: customer_id.to_string(),
            items,
            status: "pending_payment".to_string(),
            total,
            created_at: Utc::now().to_rfc3339(),
            extra: Map::new(),
        };
        self.write()
            .purchases
            .insert(purchase.purchase_id.clone(), purchase.clone());
        self.persist();
        purchase
    }

    pub fn update_purchase(&self, id: &str, updates: Map<String, Value>) -> StoreResult<Purchase> {
        let updated = {
            let mut sections = self.write();
            let purchase = sections
                .purchases
                .get_mut(id)
                .ok_or_else(|| StoreError::NotFound(format!("purchase {}", id)))?;
            for (key, value) in updates {
                match key.as_str() {
                    "status" => {
                        if let Some(status) = value.as_str() {
                            purchase.status = status.to_string();
                        }
                    }
                    _ => {
                        purchase.extra.insert(key, value);
                    }
                }
            }
            purchase.clone()
        };
        self.persist();
        Ok(updated)
    }

    pub fn get_purchase(&self, id: &str) -> StoreResult<Purchase> {
        self.read()
            .purchases
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("purchase {}", id)))
    }

    // ---- measurements ----

    pub fn save_measurements(&self, customer_id: &str, gender: &str, data: Value) {
        let key = format!("{}:{}", customer_id, gender);
        let record = json!({
            "customer_id": customer_id,
            "gender": gender,
            "measurements": data,
            "recorded_at": Utc::now().to_rfc3339(),
        });
        self.write().measurements.insert(key, record);
        self.persist();
    }

    pub fn get_customer_measurements(&self, customer_id: &str, gender: &str) -> StoreResult<Value> {
        let key = format!("{}:{}", customer_id, gender);
        self.read()
            .measurements
            .get(&key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("measurements for {}", key)))
    }

    // ---- billing / delivery / alterations ----

    pub fn save_billing(&self, purchase_id: &str, data: Value) -> Value {
        let record = json!({
            "purchase_id": purchase_id,
            "billing": data,
            "billed_at": Utc::now().to_rfc3339(),
        });
        self.write().billing.insert(purchase_id.to_string(), record.clone());
        self.persist();
        record
    }

    pub fn get_billing(&self, purchase_id: &str) -> StoreResult<Value> {
        self.read()
            .billing
            .get(purchase_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("billing for {}", purchase_id)))
    }

    pub fn schedule_delivery(&self, purchase_id: &str, option: &str, address: Value) -> Value {
        let days: i64 = match option {
            "express" => 2,
            "overnight" => 1,
            _ => 5,
        };
        let record = json!({
            "purchase_id": purchase_id,
            "option": option,
            "address": address,
            "tracking_number": format!("TRK-{}", Uuid::new_v4().simple()),
            "estimated_delivery": (Utc::now() + Duration::days(days)).format("%Y-%m-%d").to_string(),
            "scheduled_at": Utc::now().to_rfc3339(),
        });
        self.write().deliveries.insert(purchase_id.to_string(), record.clone());
        self.persist();
        record
    }

    pub fn get_delivery(&self, purchase_id: &str) -> StoreResult<Value> {
        self.read()
            .deliveries
            .get(purchase_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("delivery for {}", purchase_id)))
    }

    pub fn create_alteration_request(&self, purchase_id: &str, details: Value, cost: f64) -> Value {
        let id = format!("ALT-{}", Uuid::new_v4().simple());
        let record = json!({
            "alteration_id": id,
            "purchase_id": purchase_id,
            "details": details,
            "additional_cost": cost,
            "status": "requested",
            "requested_at": Utc::now().to_rfc3339(),
        });
        self.write().alterations.insert(id, record.clone());
        self.persist();
        record
    }
}

fn search_entries(entries: &[Value], query: &str) -> Vec<Value> {
    let needles: Vec<String> = query
        .to_lowercase()
        .split_whitespace()
        .map(str::to_string)
        .collect();
    entries
        .iter()
        .filter(|entry| {
            let haystack = entry.to_string().to_lowercase();
            needles.iter().any(|n| haystack.contains(n))
        })
        .cloned()
        .collect()
}

fn seed_sections() -> Sections {
    let mut sections = Sections::default();

    for customer in [
        Customer {
            id: "customer-456".to_string(),
            name: "John Doe".to_string(),
            email: "john.doe@example.com".to_string(),
            tier: "Gold".to_string(),
            preferences: json!({"contact_method": "email", "language": "english"})
                .as_object()
                .cloned()
                .unwrap_or_default(),
        },
        Customer {
            id: "customer-789".to_string(),
            name: "Jane Smith".to_string(),
            email: "jane.smith@example.com".to_string(),
            tier: "Platinum".to_string(),
            preferences: json!({"contact_method": "phone", "language": "english"})
                .as_object()
                .cloned()
                .unwrap_or_default(),
        },
    ] {
        sections.customers.insert(customer.id.clone(), customer);
    }

    for product in [
        Product {
            id: "PROD-001".to_string(),
            name: "Wireless Bluetooth Headphones".to_string(),
            category: "Electronics".to_string(),
            gender: None,
            price: 199.99,
            colors: vec!["black".to_string(), "silver".to_string()],
            sizes: Vec::new(),
            details: json!({"battery_life": "30 hours", "warranty": "2 years"})
                .as_object()
                .cloned()
                .unwrap_or_default(),
        },
        Product {
            id: "SHIRT-M-001".to_string(),
            name: "Men's Formal Shirt".to_string(),
            category: "Shirts".to_string(),
            gender: Some("male".to_string()),
            price: 59.99,
            colors: vec!["white".to_string(), "blue".to_string(), "black".to_string()],
            sizes: vec!["S".to_string(), "M".to_string(), "L".to_string(), "XL".to_string()],
            details: json!({"fabric": "cotton", "fit": "slim"})
                .as_object()
                .cloned()
                .unwrap_or_default(),
        },
        Product {
            id: "SHIRT-M-002".to_string(),
            name: "Men's Casual Oxford".to_string(),
            category: "Shirts".to_string(),
            gender: Some("male".to_string()),
            price: 44.99,
            colors: vec!["blue".to_string(), "grey".to_string()],
            sizes: vec!["M".to_string(), "L".to_string(), "XL".to_string()],
            details: Map::new(),
        },
        Product {
            id: "SHIRT-F-001".to_string(),
            name: "Women's Silk Blouse".to_string(),
            category: "Shirts".to_string(),
            gender: Some("female".to_string()),
            price: 79.99,
            colors: vec!["ivory".to_string(), "rose".to_string()],
            sizes: vec!["XS".to_string(), "S".to_string(), "M".to_string(), "L".to_string()],
            details: Map::new(),
        },
    ] {
        sections.catalog.insert(product.id.clone(), product);
    }

    // One old delivered order (well outside the return window) and one in
    // flight, so refund and tracking scenarios both have data to hit.
    let old_date = (Utc::now() - Duration::days(180)).format("%Y-%m-%d").to_string();
    let recent_date = (Utc::now() - Duration::days(3)).format("%Y-%m-%d").to_string();
    for order in [
        Order {
            order_id: "ORD-12345".to_string(),
            customer_id: "customer-456".to_string(),
            status: "delivered".to_string(),
            order_date: old_date.clone(),
            items: vec![OrderItem {
                product_id: "PROD-001".to_string(),
                quantity: 1,
                price: 199.99,
            }],
            total: 199.99,
            tracking: Some("TRK-789123".to_string()),
            delivery_date: Some(old_date),
        },
        Order {
            order_id: "ORD-12346".to_string(),
            customer_id: "customer-789".to_string(),
            status: "processing".to_string(),
            order_date: recent_date,
            items: vec![OrderItem {
                product_id: "SHIRT-M-001".to_string(),
                quantity: 2,
                price: 59.99,
            }],
            total: 119.98,
            tracking: Some("TRK-456789".to_string()),
            delivery_date: None,
        },
    ] {
        sections.orders.insert(order.order_id.clone(), order);
    }

    sections.knowledge_base = vec![
        json!({
            "id": "KB-001",
            "title": "Bluetooth connection problems",
            "body": "Reset the headphones by holding the power button for 10 seconds, then re-pair.",
            "tags": ["bluetooth", "headphones", "connection"],
        }),
        json!({
            "id": "KB-002",
            "title": "Device not charging",
            "body": "Try a different cable and wall adapter; verify the charging port is clean.",
            "tags": ["battery", "charging"],
        }),
    ];

    sections.faq = vec![
        json!({
            "question": "What are your business hours?",
            "answer": "Our support team is available Monday through Friday, 9am to 6pm EST.",
            "tags": ["hours", "business", "contact"],
        }),
        json!({
            "question": "What is your return policy?",
            "answer": "Items may be returned within 30 days of delivery in original condition.",
            "tags": ["returns", "policy", "refund"],
        }),
        json!({
            "question": "How do I track my order?",
            "answer": "Use the tracking number from your confirmation email on the carrier site.",
            "tags": ["tracking", "order", "shipping"],
        }),
    ];

    sections.return_policy = json!({
        "window_days": 30,
        "condition": "original condition with tags attached",
        "refund_method": "original payment method",
        "restocking_fee": 0,
    });

    sections
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_data_supports_the_demo_scenarios() {
        let store = SupportStore::in_memory();
        assert!(store.get_customer("customer-456").is_ok());
        assert!(store.get_order("ORD-12345").is_ok());
        assert_eq!(store.search_products(Some("male"), Some("shirts")).len(), 2);
        assert!(!store.search_faq("business hours").is_empty());
        assert_eq!(store.get_return_policy()["window_days"], 30);
    }

    #[test]
    fn purchase_lifecycle_read_after_write() {
        let store = SupportStore::in_memory();
        let purchase = store.create_purchase(
            "customer-456",
            vec![PurchaseItem {
                product_id: "SHIRT-M-001".to_string(),
                name: "Men's Formal Shirt".to_string(),
                size: Some("L".to_string()),
                color: Some("white".to_string()),
                price: 59.99,
            }],
        );
        assert_eq!(purchase.status, "pending_payment");

        let mut updates = Map::new();
        updates.insert("status".to_string(), json!("paid"));
        updates.insert("payment_method".to_string(), json!("card"));
        let updated = store.update_purchase(&purchase.purchase_id, updates).unwrap();
        assert_eq!(updated.status, "paid");
        assert_eq!(updated.extra["payment_method"], "card");

        let fetched = store.get_purchase(&purchase.purchase_id).unwrap();
        assert_eq!(fetched.status, "paid");
    }

    #[test]
    fn measurements_round_trip() {
        let store = SupportStore::in_memory();
        store.save_measurements("customer-456", "male", json!({"chest": 40.0, "waist": 32.0}));
        let record = store.get_customer_measurements("customer-456", "male").unwrap();
        assert_eq!(record["measurements"]["chest"], 40.0);
        assert!(store.get_customer_measurements("customer-456", "female").is_err());
    }

    #[test]
    fn delivery_scheduling_assigns_tracking() {
        let store = SupportStore::in_memory();
        let record = store.schedule_delivery("PUR-1", "express", json!({"line1": "123 Main St"}));
        assert!(record["tracking_number"].as_str().unwrap().starts_with("TRK-"));
        assert!(store.get_delivery("PUR-1").is_ok());
    }

    #[test]
    fn file_backed_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let purchase_id = {
            let store = SupportStore::open(dir.path()).unwrap();
            store
                .create_purchase(
                    "customer-789",
                    vec![PurchaseItem {
                        product_id: "SHIRT-F-001".to_string(),
                        name: "Women's Silk Blouse".to_string(),
                        size: Some("M".to_string()),
                        color: Some("ivory".to_string()),
                        price: 79.99,
                    }],
                )
                .purchase_id
        };
        let reopened = SupportStore::open(dir.path()).unwrap();
        assert!(reopened.get_purchase(&purchase_id).is_ok());
    }
}
