use std::{cmp::Ordering, collections::HashMap};
use crate::error::{Result, SupernodeError};

pub const PAGE_NUM: &str = "pageNum";
pub const PAGE_SIZE: &str = "pageSize";
pub const SORT_DIRECT: &str = "sortDirect";
pub const SORT_KEY: &str = "sortKey";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirect {
    #[default]
    Asc,
    Desc,
}

// Paging and ordering requested for a list query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageFilter {

    pub page_num: usize,

    // Zero means everything from page_num on a single page.
    pub page_size: usize,

    pub sort_direct: SortDirect,

    pub sort_key: Vec<String>,

}

impl PageFilter {

    // Builds a filter from url query values, `sort_keys` lists the accepted sort keys.
    pub fn from_query(query: &HashMap<String, String>, sort_keys: Option<&[&str]>) -> Result<Self> {
        let page_num = parse_natural(query.get(PAGE_NUM), PAGE_NUM)?;
        let page_size = parse_natural(query.get(PAGE_SIZE), PAGE_SIZE)?;

        let sort_direct = match query.get(SORT_DIRECT).map(|s| s.to_uppercase()) {
            None => SortDirect::Asc,
            Some(s) if s.is_empty() || s == "ASC" => SortDirect::Asc,
            Some(s) if s == "DESC" => SortDirect::Desc,
            Some(s) => {
                return Err(SupernodeError::InvalidValue(format!("unexpected sortDirect {}", s)))
            },
        };

        let sort_key: Vec<String> = query
            .get(SORT_KEY)
            .map(|k| k.split(',').filter(|s| !s.is_empty()).map(str::to_string).collect())
            .unwrap_or_default();
        if let Some(allowed) = sort_keys {
            if let Some(bad) = sort_key.iter().find(|k| !allowed.contains(&k.as_str())) {
                return Err(SupernodeError::InvalidValue(format!("unexpected sortKey {}", bad)));
            }
        }

        Ok(Self { page_num, page_size, sort_direct, sort_key })
    }

    // Sorts the values and cuts out the requested page.
    pub fn page<T, F>(&self, mut values: Vec<T>, mut cmp: F) -> Vec<T>
    where
        F: FnMut(&T, &T) -> Ordering,
    {
        match self.sort_direct {
            SortDirect::Asc => values.sort_by(|a, b| cmp(a, b)),
            SortDirect::Desc => values.sort_by(|a, b| cmp(b, a)),
        }
        if self.page_size == 0 {
            return values;
        }
        let start = self.page_num * self.page_size;
        if start > values.len() {
            return Vec::new();
        }
        let end = (start + self.page_size).min(values.len());
        values.drain(start..end).collect()
    }

}

fn parse_natural(value: Option<&String>, name: &str) -> Result<usize> {
    match value.map(|s| s.trim()) {
        None | Some("") => Ok(0),
        Some(s) => s.parse::<usize>().map_err(|_| {
            SupernodeError::InvalidValue(format!("{} {} is not a natural number", name, s))
        }),
    }
}
