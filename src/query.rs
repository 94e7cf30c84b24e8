//! Expansion of query-table rows into atomic `entity:start-end` lookups.
//!
//! A row may list several entities and several ranges separated by `;`.
//! Every combination becomes one [`AtomicQuery`] tagged with the row's
//! unsplit grouping key, and a [`QueryBatch`] collapses repeated regions so
//! each distinct region is looked up once per run.

use crate::errors::{AppError, Result};
use crate::table::Table;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryColumns {
    Entity { entity: String },
    Flank { entity: String, flank: String },
    Range { entity: String, start: String, end: String },
}

impl QueryColumns {
    /// Parses `q`, `q,f` or `q,b,e`; whitespace around commas is ignored.
    pub fn parse(spec: &str) -> Result<Self> {
        let names = spec
            .split(',')
            .map(str::trim)
            .map(str::to_string)
            .collect::<Vec<_>>();
        if names.iter().any(String::is_empty) {
            return Err(AppError::InvalidValue {
                flag: "--columns".to_string(),
                value: spec.to_string(),
                reason: "column names must not be empty".to_string(),
            });
        }
        match <[String; 3]>::try_from(names) {
            Ok([entity, start, end]) => Ok(Self::Range { entity, start, end }),
            Err(names) => match names.as_slice() {
                [entity] => Ok(Self::Entity {
                    entity: entity.clone(),
                }),
                [entity, flank] => Ok(Self::Flank {
                    entity: entity.clone(),
                    flank: flank.clone(),
                }),
                _ => Err(AppError::InvalidValue {
                    flag: "--columns".to_string(),
                    value: spec.to_string(),
                    reason: "expected one, two or three column names".to_string(),
                }),
            },
        }
    }

    pub fn names(&self) -> Vec<&str> {
        match self {
            Self::Entity { entity } => vec![entity.as_str()],
            Self::Flank { entity, flank } => vec![entity.as_str(), flank.as_str()],
            Self::Range { entity, start, end } => {
                vec![entity.as_str(), start.as_str(), end.as_str()]
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AtomicQuery {
    /// Grouping key of the originating row.
    pub key: String,
    /// Region string handed to the range index, `entity:start-end`.
    pub region: String,
}

fn split_values(value: &str) -> Vec<&str> {
    value.split(';').collect()
}

pub fn expand_entity(entity: &str) -> Vec<AtomicQuery> {
    vec![AtomicQuery {
        key: entity.to_string(),
        region: entity.to_string(),
    }]
}

/// Cartesian product of entities and flank specs; `_` in a flank reads as `-`.
pub fn expand_flank(entity: &str, flank: &str) -> Vec<AtomicQuery> {
    let flank = flank.replace('_', "-");
    let key = format!("{entity}:{flank}");
    let flanks = split_values(&flank);
    split_values(entity)
        .into_iter()
        .flat_map(|name| {
            flanks.iter().map(move |range| format!("{name}:{range}"))
        })
        .map(|region| AtomicQuery {
            key: key.clone(),
            region,
        })
        .collect()
}

/// Pairs starts with ends position-wise, then crosses them with every entity.
/// Extra starts or ends without a partner are ignored.
pub fn expand_range(entity: &str, start: &str, end: &str) -> Vec<AtomicQuery> {
    let key = format!("{entity}:{start}-{end}");
    let ranges = split_values(start)
        .into_iter()
        .zip(split_values(end))
        .map(|(start, end)| format!("{start}-{end}"))
        .collect::<Vec<_>>();
    split_values(entity)
        .into_iter()
        .flat_map(|name| ranges.iter().map(move |range| format!("{name}:{range}")))
        .map(|region| AtomicQuery {
            key: key.clone(),
            region,
        })
        .collect()
}

/// Deduplicated lookups for a whole run: region -> grouping keys.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct QueryBatch {
    regions: BTreeMap<String, BTreeSet<String>>,
    expanded: usize,
}

impl QueryBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Expands every row of `table`; rows with an empty entity are skipped.
    pub fn from_table(table: &Table, columns: &QueryColumns) -> Result<Self> {
        let mut batch = Self::new();
        match columns {
            QueryColumns::Entity { entity } => {
                let entity = table.column_index(entity, None)?;
                for row in 0..table.rows.len() {
                    let value = table.cell(row, entity);
                    if !value.is_empty() {
                        batch.extend(expand_entity(value));
                    }
                }
            }
            QueryColumns::Flank { entity, flank } => {
                let entity = table.column_index(entity, None)?;
                let flank = table.column_index(flank, None)?;
                for row in 0..table.rows.len() {
                    let value = table.cell(row, entity);
                    if !value.is_empty() {
                        batch.extend(expand_flank(value, table.cell(row, flank)));
                    }
                }
            }
            QueryColumns::Range { entity, start, end } => {
                let entity = table.column_index(entity, None)?;
                let start = table.column_index(start, None)?;
                let end = table.column_index(end, None)?;
                for row in 0..table.rows.len() {
                    let value = table.cell(row, entity);
                    if !value.is_empty() {
                        batch.extend(expand_range(
                            value,
                            table.cell(row, start),
                            table.cell(row, end),
                        ));
                    }
                }
            }
        }
        Ok(batch)
    }

    pub fn insert(&mut self, query: AtomicQuery) {
        self.expanded += 1;
        self.regions.entry(query.region).or_default().insert(query.key);
    }

    /// Distinct regions in sorted order.
    pub fn regions(&self) -> Vec<&str> {
        self.regions.keys().map(String::as_str).collect()
    }

    pub fn keys_for(&self, region: &str) -> impl Iterator<Item = &str> {
        self.regions
            .get(region)
            .into_iter()
            .flat_map(|keys| keys.iter().map(String::as_str))
    }

    /// Number of atomic queries before deduplication.
    pub fn expanded_len(&self) -> usize {
        self.expanded
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}

impl Extend<AtomicQuery> for QueryBatch {
    fn extend<T: IntoIterator<Item = AtomicQuery>>(&mut self, iter: T) {
        for query in iter {
            self.insert(query);
        }
    }
}
