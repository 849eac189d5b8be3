//! Filtered, ordered multi-record queries

use super::path::CollectionPath;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::borrow::Cow;

/// Comparison applied by a [`Filter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FilterOp {
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    NotEq,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
    /// Field is an array containing the value
    #[serde(rename = "array-contains")]
    ArrayContains,
    /// Field equals one of the values in an array
    #[serde(rename = "in")]
    In,
}

impl FilterOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::NotEq => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::ArrayContains => "array-contains",
            Self::In => "in",
        }
    }
}

impl std::fmt::Display for FilterOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Field predicate: `field op value`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub field: String,
    pub op: FilterOp,
    pub value: Value,
}

impl Filter {
    pub fn new(field: impl Into<String>, op: FilterOp, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            op,
            value: value.into(),
        }
    }

    fn canonical_key(&self) -> (&str, FilterOp, String) {
        (&self.field, self.op, self.value.to_string())
    }
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

/// One sort key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderBy {
    pub field: String,
    pub direction: Direction,
}

/// Whether the order filters were added in matters for equality.
///
/// `Sensitive` is the default: `where(a).where(b)` and `where(b).where(a)`
/// are different subscriptions unless the caller opts into `Insensitive`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterOrder {
    #[default]
    Sensitive,
    Insensitive,
}

impl FilterOrder {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "sensitive" => Some(Self::Sensitive),
            "insensitive" => Some(Self::Insensitive),
            _ => None,
        }
    }
}

/// A query against one collection.
///
/// # Example
///
/// ```rust,ignore
/// let lost = Query::new(CollectionPath::new("lostAndFoundItems"))
///     .where_eq("type", "lost")
///     .order_by("createdAt", Direction::Desc);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub collection: CollectionPath,
    #[serde(default)]
    pub filters: Vec<Filter>,
    #[serde(default)]
    pub order_by: Vec<OrderBy>,
    #[serde(default)]
    pub limit: Option<u32>,
}

impl Query {
    /// Every record in `collection`, store order.
    pub fn new(collection: CollectionPath) -> Self {
        Self {
            collection,
            filters: Vec::new(),
            order_by: Vec::new(),
            limit: None,
        }
    }

    pub fn filter(mut self, field: impl Into<String>, op: FilterOp, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::new(field, op, value));
        self
    }

    pub fn where_eq(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(field, FilterOp::Eq, value)
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.order_by.push(OrderBy {
            field: field.into(),
            direction,
        });
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// The query as compared under `policy`: filters sorted into a canonical
    /// order when order is insignificant, borrowed unchanged otherwise.
    pub fn normalized(&self, policy: FilterOrder) -> Cow<'_, Query> {
        match policy {
            FilterOrder::Sensitive => Cow::Borrowed(self),
            FilterOrder::Insensitive => {
                let mut query = self.clone();
                query
                    .filters
                    .sort_by(|a, b| a.canonical_key().cmp(&b.canonical_key()));
                Cow::Owned(query)
            }
        }
    }

    /// Structural equality of the addressed result under `policy`.
    pub fn same_as(&self, other: &Query, policy: FilterOrder) -> bool {
        if self.collection != other.collection
            || self.order_by != other.order_by
            || self.limit != other.limit
            || self.filters.len() != other.filters.len()
        {
            return false;
        }
        self.normalized(policy).filters == other.normalized(policy).filters
    }
}

impl std::fmt::Display for Query {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.collection)?;
        for filter in &self.filters {
            write!(f, " where {} {} {}", filter.field, filter.op, filter.value)?;
        }
        for order in &self.order_by {
            let dir = match order.direction {
                Direction::Asc => "asc",
                Direction::Desc => "desc",
            };
            write!(f, " order by {} {}", order.field, dir)?;
        }
        if let Some(limit) = self.limit {
            write!(f, " limit {}", limit)?;
        }
        Ok(())
    }
}
