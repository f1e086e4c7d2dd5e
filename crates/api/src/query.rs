//! Query parameter types for API handlers.

use serde::Deserialize;
use taskmaster_core::error::CoreError;
use taskmaster_core::query::{FilterField, ProjectQuery, SortKey, SortOrder};

/// `GET /api/projects` parameters: equality filters, sort, and paging.
#[derive(Debug, Default, Deserialize)]
pub struct ListProjectsParams {
    pub name: Option<String>,
    pub category: Option<String>,
    pub subcategory: Option<String>,
    pub status: Option<String>,
    pub manager: Option<String>,
    pub supervisor: Option<String>,
    pub sort: Option<String>,
    pub order: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl TryFrom<ListProjectsParams> for ProjectQuery {
    type Error = CoreError;

    fn try_from(params: ListProjectsParams) -> Result<Self, Self::Error> {
        let sort: Option<SortKey> = params.sort.as_deref().map(str::parse).transpose()?;
        let order: Option<SortOrder> = params.order.as_deref().map(str::parse).transpose()?;

        let mut query = ProjectQuery::default()
            .sorted_by(sort.unwrap_or_default(), order.unwrap_or_default())
            .paged(params.limit, params.offset.unwrap_or(0));

        let filters = [
            (FilterField::Name, params.name),
            (FilterField::Category, params.category),
            (FilterField::Subcategory, params.subcategory),
            (FilterField::Status, params.status),
            (FilterField::Manager, params.manager),
            (FilterField::Supervisor, params.supervisor),
        ];
        for (field, value) in filters {
            if let Some(value) = value.filter(|v| !v.is_empty()) {
                query = query.filter(field, value);
            }
        }
        Ok(query)
    }
}
