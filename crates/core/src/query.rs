//! Read-side filtering, sorting, and paging for project listings.
//!
//! [`ProjectQuery::select`] works over a borrowed snapshot and returns
//! positions into it, so callers can iterate matching records lazily
//! without cloning them.

use std::cmp::Ordering;
use std::str::FromStr;

use crate::error::CoreError;
use crate::project::Project;

/// Maximum page size accepted from clients.
pub const MAX_LIMIT: usize = 1000;

/// Fields that support equality filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterField {
    Name,
    Category,
    Subcategory,
    Status,
    Manager,
    Supervisor,
}

impl FilterField {
    fn value<'a>(self, project: &'a Project) -> Option<&'a str> {
        match self {
            Self::Name => Some(&project.name),
            Self::Category => Some(&project.category),
            Self::Subcategory => Some(&project.subcategory),
            Self::Status => project.status.as_deref(),
            Self::Manager => project.manager.as_deref(),
            Self::Supervisor => project.supervisor.as_deref(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortKey {
    #[default]
    CreatedAt,
    UpdatedAt,
    Name,
    StartDate,
    Status,
}

impl FromStr for SortKey {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created_at" => Ok(Self::CreatedAt),
            "updated_at" => Ok(Self::UpdatedAt),
            "name" => Ok(Self::Name),
            "start_date" => Ok(Self::StartDate),
            "status" => Ok(Self::Status),
            other => Err(CoreError::Validation(format!(
                "Unknown sort key '{other}'. Must be one of: created_at, updated_at, name, start_date, status"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl FromStr for SortOrder {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "asc" => Ok(Self::Asc),
            "desc" => Ok(Self::Desc),
            other => Err(CoreError::Validation(format!(
                "Unknown sort order '{other}'. Must be 'asc' or 'desc'"
            ))),
        }
    }
}

/// Listing criteria. The default lists everything, newest first.
#[derive(Debug, Clone, Default)]
pub struct ProjectQuery {
    pub filters: Vec<(FilterField, String)>,
    pub sort: SortKey,
    pub order: SortOrder,
    pub limit: Option<usize>,
    pub offset: usize,
}

impl ProjectQuery {
    pub fn filter(mut self, field: FilterField, value: impl Into<String>) -> Self {
        self.filters.push((field, value.into()));
        self
    }

    pub fn sorted_by(mut self, sort: SortKey, order: SortOrder) -> Self {
        self.sort = sort;
        self.order = order;
        self
    }

    pub fn paged(mut self, limit: Option<usize>, offset: usize) -> Self {
        self.limit = limit.map(|l| l.min(MAX_LIMIT));
        self.offset = offset;
        self
    }

    /// True when `project` satisfies every equality filter.
    pub fn matches(&self, project: &Project) -> bool {
        self.filters
            .iter()
            .all(|(field, expected)| field.value(project) == Some(expected.as_str()))
    }

    /// Ordering between two projects under this query's sort. Ties fall back
    /// to `id` so listings are deterministic.
    pub fn compare(&self, a: &Project, b: &Project) -> Ordering {
        let primary = match self.sort {
            SortKey::CreatedAt => a.created_at.cmp(&b.created_at),
            SortKey::UpdatedAt => a.updated_at.cmp(&b.updated_at),
            SortKey::Name => a.name.cmp(&b.name),
            SortKey::StartDate => a.start_date.cmp(&b.start_date),
            SortKey::Status => a.status.cmp(&b.status),
        }
        .then_with(|| a.id.cmp(&b.id));

        match self.order {
            SortOrder::Asc => primary,
            SortOrder::Desc => primary.reverse(),
        }
    }

    /// Positions of the selected projects within `projects`, in listing order.
    pub fn select(&self, projects: &[Project]) -> Vec<usize> {
        let mut positions: Vec<usize> = projects
            .iter()
            .enumerate()
            .filter(|(_, p)| self.matches(p))
            .map(|(i, _)| i)
            .collect();
        positions.sort_by(|&a, &b| self.compare(&projects[a], &projects[b]));

        let limit = self.limit.unwrap_or(usize::MAX);
        positions.into_iter().skip(self.offset).take(limit).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::NewProject;
    use chrono::{Duration, Utc};

    fn project(name: &str, status: Option<&str>, minutes: i64) -> Project {
        let now = Utc::now() + Duration::minutes(minutes);
        Project::create(
            NewProject {
                name: Some(name.into()),
                category: Some("infra".into()),
                subcategory: Some("net".into()),
                status: status.map(String::from),
                ..Default::default()
            },
            now,
        )
        .unwrap()
    }

    fn names(projects: &[Project], positions: &[usize]) -> Vec<String> {
        positions.iter().map(|&i| projects[i].name.clone()).collect()
    }

    #[test]
    fn default_lists_newest_first() {
        let projects = vec![project("old", None, 0), project("new", None, 10), project("mid", None, 5)];
        let selected = ProjectQuery::default().select(&projects);
        assert_eq!(names(&projects, &selected), ["new", "mid", "old"]);
    }

    #[test]
    fn equality_filters_combine() {
        let projects = vec![
            project("a", Some("done"), 0),
            project("b", Some("open"), 1),
            project("c", None, 2),
        ];
        let query = ProjectQuery::default()
            .filter(FilterField::Status, "done")
            .filter(FilterField::Category, "infra");
        assert_eq!(names(&projects, &query.select(&projects)), ["a"]);

        let none = ProjectQuery::default().filter(FilterField::Manager, "X");
        assert!(none.select(&projects).is_empty());
    }

    #[test]
    fn sort_by_name_ascending_with_paging() {
        let projects = vec![project("c", None, 0), project("a", None, 1), project("b", None, 2)];
        let query = ProjectQuery::default()
            .sorted_by(SortKey::Name, SortOrder::Asc)
            .paged(Some(2), 1);
        assert_eq!(names(&projects, &query.select(&projects)), ["b", "c"]);
    }

    #[test]
    fn limit_is_clamped() {
        let query = ProjectQuery::default().paged(Some(1_000_000), 0);
        assert_eq!(query.limit, Some(MAX_LIMIT));
    }

    #[test]
    fn parse_sort_and_order() {
        assert_eq!("start_date".parse::<SortKey>().unwrap(), SortKey::StartDate);
        assert_eq!("ASC".parse::<SortOrder>().unwrap(), SortOrder::Asc);
        assert!("priority".parse::<SortKey>().is_err());
        assert!("sideways".parse::<SortOrder>().is_err());
    }
}
