//! Partitions, secondary indexes and the [`Record`] trait

use redb::TableDefinition;
use serde::Serialize;
use serde::de::DeserializeOwned;
use shared::{
    ConflictRecord, LocalCustomer, LocalOrder, LocalProduct, OrderTimeline, SettingRecord,
};

/// products: key = product id, value = JSON LocalProduct
const PRODUCTS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("products");

/// orders: key = offline order id (UUID), value = JSON LocalOrder
const ORDERS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("orders");

/// customers: key = customer id, value = JSON LocalCustomer
const CUSTOMERS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("customers");

/// settings: key = setting key, value = JSON SettingRecord
const SETTINGS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("settings");

/// conflicts: key = order id, value = JSON ConflictRecord
const CONFLICTS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("conflicts");

/// sync_logs: key = order id, value = JSON OrderTimeline
const SYNC_LOGS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("sync_logs");

/// Secondary index: (index name, record key) -> ()
pub(crate) const INDEX_TABLE: TableDefinition<(&str, &str), ()> =
    TableDefinition::new("secondary_index");

/// Named record partition of the local store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Partition {
    Products,
    Orders,
    Customers,
    Settings,
    Conflicts,
    SyncLogs,
}

impl Partition {
    pub const ALL: [Partition; 6] = [
        Partition::Products,
        Partition::Orders,
        Partition::Customers,
        Partition::Settings,
        Partition::Conflicts,
        Partition::SyncLogs,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Partition::Products => "products",
            Partition::Orders => "orders",
            Partition::Customers => "customers",
            Partition::Settings => "settings",
            Partition::Conflicts => "conflicts",
            Partition::SyncLogs => "sync_logs",
        }
    }

    pub(crate) fn table(&self) -> TableDefinition<'static, &'static str, &'static [u8]> {
        match self {
            Partition::Products => PRODUCTS_TABLE,
            Partition::Orders => ORDERS_TABLE,
            Partition::Customers => CUSTOMERS_TABLE,
            Partition::Settings => SETTINGS_TABLE,
            Partition::Conflicts => CONFLICTS_TABLE,
            Partition::SyncLogs => SYNC_LOGS_TABLE,
        }
    }

    /// Secondary indexes maintained for this partition
    pub fn indexes(&self) -> &'static [Index] {
        match self {
            Partition::Orders => &[Index::UnsyncedOrders],
            Partition::Conflicts => &[Index::UnresolvedConflicts],
            _ => &[],
        }
    }
}

/// Named secondary predicate, maintained on every write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Index {
    /// Orders with `synced == false`
    UnsyncedOrders,
    /// Conflicts with `resolved == false`
    UnresolvedConflicts,
}

impl Index {
    pub fn name(&self) -> &'static str {
        match self {
            Index::UnsyncedOrders => "orders:unsynced",
            Index::UnresolvedConflicts => "conflicts:unresolved",
        }
    }

    pub fn partition(&self) -> Partition {
        match self {
            Index::UnsyncedOrders => Partition::Orders,
            Index::UnresolvedConflicts => Partition::Conflicts,
        }
    }
}

/// A value stored in exactly one partition under one unique key
pub trait Record: Serialize + DeserializeOwned {
    const PARTITION: Partition;

    fn key(&self) -> String;

    /// Indexes this record currently belongs to
    fn index_memberships(&self) -> Vec<Index> {
        Vec::new()
    }
}

impl Record for LocalProduct {
    const PARTITION: Partition = Partition::Products;

    fn key(&self) -> String {
        self.id.to_string()
    }
}

impl Record for LocalCustomer {
    const PARTITION: Partition = Partition::Customers;

    fn key(&self) -> String {
        self.id.to_string()
    }
}

impl Record for SettingRecord {
    const PARTITION: Partition = Partition::Settings;

    fn key(&self) -> String {
        self.key.clone()
    }
}

impl Record for LocalOrder {
    const PARTITION: Partition = Partition::Orders;

    fn key(&self) -> String {
        self.id.clone()
    }

    fn index_memberships(&self) -> Vec<Index> {
        if self.synced {
            Vec::new()
        } else {
            vec![Index::UnsyncedOrders]
        }
    }
}

impl Record for ConflictRecord {
    const PARTITION: Partition = Partition::Conflicts;

    fn key(&self) -> String {
        self.order_id.clone()
    }

    fn index_memberships(&self) -> Vec<Index> {
        if self.resolved {
            Vec::new()
        } else {
            vec![Index::UnresolvedConflicts]
        }
    }
}

impl Record for OrderTimeline {
    const PARTITION: Partition = Partition::SyncLogs;

    fn key(&self) -> String {
        self.order_id.clone()
    }
}
