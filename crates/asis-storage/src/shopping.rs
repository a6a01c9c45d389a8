//! Shopping list persistence.

use std::sync::Arc;

use rusqlite::types::ToSql;
use rusqlite::OptionalExtension;
use uuid::Uuid;

use asis_core::error::AsisError;
use asis_core::types::ShoppingItem;

use crate::db::{col, contains_ci, storage_err, time_col, uuid_col, Database};

const ITEM_COLUMNS: &str =
    "id, name, quantity, category, purchased, notes, price_estimate, created_at";

/// Filters for [`ShoppingRepository::list`].
#[derive(Debug, Clone, Default)]
pub struct ShoppingFilter {
    pub purchased: Option<bool>,
    pub category: Option<String>,
}

impl ShoppingFilter {
    pub fn pending() -> Self {
        Self {
            purchased: Some(false),
            category: None,
        }
    }
}

/// Repository for shopping list items.
pub struct ShoppingRepository {
    db: Arc<Database>,
}

impl ShoppingRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Store a new item.
    pub fn create(&self, item: &ShoppingItem) -> Result<(), AsisError> {
        self.db.with_conn(|conn| {
            conn.execute(
                &format!(
                    "INSERT INTO shopping_items ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    ITEM_COLUMNS
                ),
                rusqlite::params![
                    item.id.to_string(),
                    item.name,
                    item.quantity,
                    item.category,
                    item.purchased as i32,
                    item.notes,
                    item.price_estimate,
                    item.created_at.timestamp(),
                ],
            )
            .map_err(|e| AsisError::Storage(format!("Failed to save shopping item: {}", e)))?;
            Ok(())
        })
    }

    /// Find an item by ID.
    pub fn get(&self, id: Uuid) -> Result<Option<ShoppingItem>, AsisError> {
        self.db.with_conn(|conn| {
            let result = conn
                .query_row(
                    &format!("SELECT {} FROM shopping_items WHERE id = ?1", ITEM_COLUMNS),
                    rusqlite::params![id.to_string()],
                    |row| Ok(row_to_item(row)),
                )
                .optional()
                .map_err(storage_err)?;
            result.transpose()
        })
    }

    /// List items matching the filter in creation order.
    pub fn list(&self, filter: &ShoppingFilter) -> Result<Vec<ShoppingItem>, AsisError> {
        let mut clauses: Vec<&str> = Vec::new();
        let mut params: Vec<Box<dyn ToSql>> = Vec::new();

        if let Some(purchased) = filter.purchased {
            clauses.push("purchased = ?");
            params.push(Box::new(purchased as i32));
        }
        if let Some(ref category) = filter.category {
            clauses.push("category = ? COLLATE NOCASE");
            params.push(Box::new(category.clone()));
        }

        let where_sql = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        };
        let sql = format!(
            "SELECT {} FROM shopping_items {} ORDER BY created_at ASC, rowid ASC",
            ITEM_COLUMNS, where_sql
        );

        self.db.with_conn(|conn| {
            let param_refs: Vec<&dyn ToSql> = params.iter().map(|p| p.as_ref()).collect();
            let mut stmt = conn
                .prepare(&sql)
                .map_err(|e| AsisError::Storage(format!("Shopping query prepare: {}", e)))?;
            let rows = stmt
                .query_map(param_refs.as_slice(), |row| Ok(row_to_item(row)))
                .map_err(|e| AsisError::Storage(format!("Shopping query: {}", e)))?;

            let mut items = Vec::new();
            for row in rows {
                items.push(row.map_err(storage_err)??);
            }
            Ok(items)
        })
    }

    /// First item (in creation order) whose name contains `text`, ignoring case.
    pub fn find_by_name(
        &self,
        text: &str,
        filter: &ShoppingFilter,
    ) -> Result<Option<ShoppingItem>, AsisError> {
        Ok(self
            .list(filter)?
            .into_iter()
            .find(|item| contains_ci(&item.name, text)))
    }

    /// Persist every mutable field of `item`.
    pub fn update(&self, item: &ShoppingItem) -> Result<Option<ShoppingItem>, AsisError> {
        let changed = self.db.with_conn(|conn| {
            conn.execute(
                "UPDATE shopping_items SET name = ?2, quantity = ?3, category = ?4,
                        purchased = ?5, notes = ?6, price_estimate = ?7
                 WHERE id = ?1",
                rusqlite::params![
                    item.id.to_string(),
                    item.name,
                    item.quantity,
                    item.category,
                    item.purchased as i32,
                    item.notes,
                    item.price_estimate,
                ],
            )
            .map_err(|e| AsisError::Storage(format!("Failed to update shopping item: {}", e)))
        })?;

        if changed == 0 {
            return Ok(None);
        }
        self.get(item.id)
    }

    /// Set the purchased flag.
    pub fn set_purchased(&self, id: Uuid, purchased: bool) -> Result<Option<ShoppingItem>, AsisError> {
        match self.get(id)? {
            Some(mut item) => {
                item.purchased = purchased;
                self.update(&item)
            }
            None => Ok(None),
        }
    }

    /// Delete an item by ID.
    pub fn delete(&self, id: Uuid) -> Result<bool, AsisError> {
        self.db.with_conn(|conn| {
            let changed = conn
                .execute(
                    "DELETE FROM shopping_items WHERE id = ?1",
                    rusqlite::params![id.to_string()],
                )
                .map_err(storage_err)?;
            Ok(changed > 0)
        })
    }

    /// Remove every purchased item. Returns how many were removed.
    pub fn clear_purchased(&self) -> Result<usize, AsisError> {
        self.db.with_conn(|conn| {
            conn.execute("DELETE FROM shopping_items WHERE purchased = 1", [])
                .map_err(storage_err)
        })
    }
}

fn row_to_item(row: &rusqlite::Row<'_>) -> Result<ShoppingItem, AsisError> {
    let purchased: i32 = col(row, 4)?;
    Ok(ShoppingItem {
        id: uuid_col(row, 0)?,
        name: col(row, 1)?,
        quantity: col(row, 2)?,
        category: col(row, 3)?,
        purchased: purchased != 0,
        notes: col(row, 5)?,
        price_estimate: col(row, 6)?,
        created_at: time_col(row, 7)?,
    })
}
