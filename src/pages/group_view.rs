// Group View - per-currency totals and per-category aggregates of one group

use crate::backend::{rpc_rows, Backend};
use crate::entities::{CategoryAggregate, Group, GroupTotal};
use crate::error::BackendResult;
use crate::groups::all_groups_sorted;
use serde::Serialize;
use serde_json::json;

pub const TOTALS_RPC: &str = "group_aggregate_totals";
pub const BY_CATEGORY_RPC: &str = "group_aggregate_by_category";

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GroupAggregates {
    pub totals: Vec<GroupTotal>,
    pub by_category: Vec<CategoryAggregate>,
}

impl GroupAggregates {
    pub fn load(backend: &dyn Backend, group_id: &str) -> BackendResult<Self> {
        Ok(Self {
            totals: rpc_rows(backend, TOTALS_RPC, json!({ "g": group_id }))?,
            by_category: rpc_rows(backend, BY_CATEGORY_RPC, json!({ "g": group_id }))?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupViewPage {
    pub groups: Vec<Group>,
    pub selected: Option<Group>,
    pub aggregates: GroupAggregates,
}

impl GroupViewPage {
    /// Groups A→Z ignoring case, first one selected
    pub fn load(backend: &dyn Backend) -> BackendResult<Self> {
        let groups = all_groups_sorted(backend)?;
        let selected = groups.first().cloned();
        let aggregates = match &selected {
            Some(group) => GroupAggregates::load(backend, &group.id)?,
            None => GroupAggregates::default(),
        };
        Ok(Self {
            groups,
            selected,
            aggregates,
        })
    }

    pub fn select(&mut self, backend: &dyn Backend, group_id: &str) -> BackendResult<()> {
        let Some(group) = self.groups.iter().find(|g| g.id == group_id).cloned() else {
            return Ok(());
        };
        self.aggregates = GroupAggregates::load(backend, &group.id)?;
        self.selected = Some(group);
        Ok(())
    }
}
