//! Static dealer and counterparty registry.
//!
//! The registry is built once at startup and shared read-only. The customer
//! list is kept for trade recording against the ledger; nothing in the
//! console reads it beyond listing.

use std::collections::BTreeMap;

use crate::types::{DealerIdentity, DealerLevel};

const ADMIN_PERMISSIONS: &[&str] = &["view_rates", "record_trades", "manage_dealers", "view_ledger"];
const SENIOR_PERMISSIONS: &[&str] = &["view_rates", "record_trades", "view_ledger"];
const STANDARD_PERMISSIONS: &[&str] = &["view_rates", "record_trades"];
const JUNIOR_PERMISSIONS: &[&str] = &["view_rates"];

const CUSTOMERS: &[&str] = &[
    "Golden Crown Jewellers",
    "Noor Bullion Trading",
    "Pars Mint House",
    "Atlas Refinery",
    "Silk Road Metals",
    "Zagros Gold Co.",
];

/// Read-only lookup of dealers by id, plus the counterparty names.
#[derive(Debug, Clone)]
pub struct Registry {
    dealers: BTreeMap<String, DealerIdentity>,
    customers: Vec<String>,
}

impl Registry {
    pub fn new(dealers: Vec<DealerIdentity>, customers: Vec<String>) -> Self {
        Self {
            dealers: dealers.into_iter().map(|d| (d.id.clone(), d)).collect(),
            customers,
        }
    }

    /// The dealer table shipped with the desk.
    pub fn builtin() -> Self {
        let dealers = vec![
            DealerIdentity::new("1001", "Arash", DealerLevel::Admin, true, ADMIN_PERMISSIONS),
            DealerIdentity::new("2270", "Peiman", DealerLevel::Senior, true, SENIOR_PERMISSIONS),
            DealerIdentity::new("3184", "Sara", DealerLevel::Standard, true, STANDARD_PERMISSIONS),
            DealerIdentity::new("4402", "Kian", DealerLevel::Junior, true, JUNIOR_PERMISSIONS),
            DealerIdentity::new("5517", "Nima", DealerLevel::Standard, false, STANDARD_PERMISSIONS),
        ];
        let customers = CUSTOMERS.iter().map(|c| c.to_string()).collect();
        Self::new(dealers, customers)
    }

    /// Look up any dealer, active or not.
    pub fn dealer(&self, id: &str) -> Option<&DealerIdentity> {
        self.dealers.get(id)
    }

    /// Look up a dealer that is allowed to log in.
    pub fn active_dealer(&self, id: &str) -> Option<&DealerIdentity> {
        self.dealer(id).filter(|d| d.active)
    }

    /// Active dealers ordered by id.
    pub fn active_dealers(&self) -> Vec<&DealerIdentity> {
        self.dealers.values().filter(|d| d.active).collect()
    }

    pub fn customers(&self) -> &[String] {
        &self.customers
    }
}
