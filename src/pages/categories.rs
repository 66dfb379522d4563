// 🏷️ Categories page - shared category list, editable by superadmins
//
// Rows are edited locally (marking them dirty) and written one at a time.

use super::settle;
use crate::access::Viewer;
use crate::backend::{fetch, Backend, Query};
use crate::entities::category::{Category, CategoryPayload, CATEGORY_TABLE};
use crate::error::{BackendError, BackendResult, Notice};
use chrono::{DateTime, Utc};

pub const CATEGORY_COLUMNS: &str = "id,name,color,icon,priority,is_active,created_at,updated_at";
pub const ADMIN_ONLY: &str = "Only superadmin can manage categories.";

/// Sort order for category pickers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PickerOrder {
    Name,
    Priority,
}

/// Active categories for selectors
pub fn active_categories(backend: &dyn Backend, order: PickerOrder) -> BackendResult<Vec<Category>> {
    let query = Query::new().select(CATEGORY_COLUMNS).eq("is_active", true);
    let query = match order {
        PickerOrder::Name => query.order("name", true),
        PickerOrder::Priority => query.order("priority", true),
    };
    fetch(backend, CATEGORY_TABLE, &query)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CategoryField {
    Name,
    Priority,
    Color,
    Icon,
}

/// Text inputs for one category (a table row or the add form)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CategoryDraft {
    pub name: String,
    pub priority: String,
    pub color: String,
    pub icon: String,
}

impl CategoryDraft {
    pub fn from_category(category: &Category) -> Self {
        Self {
            name: category.name.clone(),
            priority: category.priority.to_string(),
            color: category.color.clone().unwrap_or_default(),
            icon: category.icon.clone().unwrap_or_default(),
        }
    }

    pub fn set(&mut self, field: CategoryField, value: &str) {
        let slot = match field {
            CategoryField::Name => &mut self.name,
            CategoryField::Priority => &mut self.priority,
            CategoryField::Color => &mut self.color,
            CategoryField::Icon => &mut self.icon,
        };
        *slot = value.to_string();
    }

    pub fn payload(&self) -> CategoryPayload {
        CategoryPayload::from_inputs(&self.name, &self.priority, &self.color, &self.icon)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CategoryRow {
    pub category: Category,
    pub draft: CategoryDraft,
    pub dirty: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CategoriesPage {
    pub is_superadmin: bool,
    pub rows: Vec<CategoryRow>,
    pub adding: CategoryDraft,
    pub notice: Option<Notice>,
}

impl CategoriesPage {
    pub fn load(backend: &dyn Backend) -> BackendResult<Self> {
        let viewer = Viewer::load(backend)?;
        let mut page = Self {
            is_superadmin: viewer.is_superadmin,
            rows: Vec::new(),
            adding: CategoryDraft::default(),
            notice: None,
        };
        page.refresh(backend)?;
        Ok(page)
    }

    /// Priority, then name
    pub fn refresh(&mut self, backend: &dyn Backend) -> BackendResult<()> {
        let categories: Vec<Category> = fetch(
            backend,
            CATEGORY_TABLE,
            &Query::new()
                .select(CATEGORY_COLUMNS)
                .order("priority", true)
                .order("name", true),
        )?;
        self.rows = categories
            .into_iter()
            .map(|category| CategoryRow {
                draft: CategoryDraft::from_category(&category),
                category,
                dirty: false,
            })
            .collect();
        Ok(())
    }

    pub fn read_only(&self) -> bool {
        !self.is_superadmin
    }

    fn guard(&self) -> BackendResult<()> {
        if self.is_superadmin {
            Ok(())
        } else {
            Err(BackendError::forbidden(ADMIN_ONLY))
        }
    }

    /// Local edit; returns false for unknown rows or read-only viewers
    pub fn edit(&mut self, id: &str, field: CategoryField, value: &str) -> bool {
        if self.read_only() {
            return false;
        }
        match self.rows.iter_mut().find(|r| r.category.id == id) {
            Some(row) => {
                row.draft.set(field, value);
                row.dirty = true;
                true
            }
            None => false,
        }
    }

    pub fn save_row(&mut self, backend: &dyn Backend, id: &str, now: DateTime<Utc>) -> BackendResult<()> {
        let result = self.guard().and_then(|_| {
            let row = self
                .rows
                .iter()
                .find(|r| r.category.id == id)
                .ok_or_else(|| BackendError::NotFound(format!("category {}", id)))?;
            let payload = row.draft.payload().touched(now);
            backend.update(
                CATEGORY_TABLE,
                serde_json::to_value(&payload)?,
                &Query::new().eq("id", id),
            )?;
            tracing::info!(category = %id, name = %payload.name, "updated category");
            self.refresh(backend)
        });
        settle(&mut self.notice, "save category", result)
    }

    pub fn delete_row(&mut self, backend: &dyn Backend, id: &str) -> BackendResult<()> {
        let result = self.guard().and_then(|_| {
            backend.delete(CATEGORY_TABLE, &Query::new().eq("id", id))?;
            tracing::info!(category = %id, "deleted category");
            self.refresh(backend)
        });
        settle(&mut self.notice, "delete category", result)
    }

    /// Blank names are ignored
    pub fn add(&mut self, backend: &dyn Backend) -> BackendResult<()> {
        let result = self.guard().and_then(|_| {
            let payload = self.adding.payload();
            if payload.name.is_empty() {
                return Ok(());
            }
            backend.insert(CATEGORY_TABLE, serde_json::to_value(&payload)?)?;
            tracing::info!(name = %payload.name, "added category");
            self.adding = CategoryDraft::default();
            self.refresh(backend)
        });
        settle(&mut self.notice, "add category", result)
    }
}
