//! Query keys: value-compared descriptions of what data is being asked for.

use std::collections::BTreeMap;
use std::fmt;

use crate::api::types::LinkId;

/// Remote resource collections a key can address.
///
/// Used as the key prefix for invalidation ("everything under `links`").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Resource {
  Links,
  Clicks,
  Link,
  LinkStats,
}

impl Resource {
  pub fn name(&self) -> &'static str {
    match self {
      Resource::Links => "links",
      Resource::Clicks => "clicks",
      Resource::Link => "link",
      Resource::LinkStats => "linkStats",
    }
  }
}

/// Filter names a paged resource can be constrained by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FilterField {
  Country,
  IsBot,
}

impl FilterField {
  /// Query parameter name sent to the server
  pub fn param(&self) -> &'static str {
    match self {
      FilterField::Country => "country",
      FilterField::IsBot => "is_bot",
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FilterValue {
  Text(String),
  Flag(bool),
}

impl fmt::Display for FilterValue {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      FilterValue::Text(s) => f.write_str(s),
      FilterValue::Flag(b) => write!(f, "{}", b),
    }
  }
}

/// Active filter set. A field that is absent means "no constraint";
/// there is no stored "empty" marker.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Filters(BTreeMap<FilterField, FilterValue>);

impl Filters {
  pub fn new() -> Self {
    Self::default()
  }

  /// Set or remove a filter. Empty text counts as absent.
  ///
  /// Returns true if the filter set changed.
  pub fn set(&mut self, field: FilterField, value: Option<FilterValue>) -> bool {
    let value = value.filter(|v| !matches!(v, FilterValue::Text(s) if s.is_empty()));
    match value {
      Some(v) => self.0.insert(field, v.clone()).as_ref() != Some(&v),
      None => self.0.remove(&field).is_some(),
    }
  }

  pub fn get(&self, field: FilterField) -> Option<&FilterValue> {
    self.0.get(&field)
  }

  #[cfg(test)]
  pub fn contains(&self, field: FilterField) -> bool {
    self.0.contains_key(&field)
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  pub fn iter(&self) -> impl Iterator<Item = (FilterField, &FilterValue)> {
    self.0.iter().map(|(k, v)| (*k, v))
  }

  /// Query parameters in a stable order
  pub fn query_params(&self) -> Vec<(&'static str, String)> {
    self.iter().map(|(k, v)| (k.param(), v.to_string())).collect()
  }
}

/// Identifies one cache entry.
///
/// Two keys are the same entry exactly when they compare equal; identity of
/// the values never matters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum QueryKey {
  /// One page of a collection: (resource, page, page size, filters)
  Page {
    resource: Resource,
    page: u32,
    page_size: u32,
    filters: Filters,
  },
  /// A view of one entity: (resource, id)
  Entity { resource: Resource, id: LinkId },
}

impl QueryKey {
  pub fn page(resource: Resource, page: u32, page_size: u32, filters: Filters) -> Self {
    QueryKey::Page {
      resource,
      page,
      page_size,
      filters,
    }
  }

  pub fn entity(resource: Resource, id: LinkId) -> Self {
    QueryKey::Entity { resource, id }
  }

  pub fn resource(&self) -> Resource {
    match self {
      QueryKey::Page { resource, .. } | QueryKey::Entity { resource, .. } => *resource,
    }
  }
}

impl fmt::Display for QueryKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      QueryKey::Page {
        resource,
        page,
        page_size,
        filters,
      } => {
        write!(f, "{}[page={} size={}", resource.name(), page, page_size)?;
        for (field, value) in filters.iter() {
          write!(f, " {}={}", field.param(), value)?;
        }
        f.write_str("]")
      }
      QueryKey::Entity { resource, id } => write!(f, "{}[{}]", resource.name(), id),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_keys_compare_by_value() {
    let mut a = Filters::new();
    a.set(FilterField::IsBot, Some(FilterValue::Flag(true)));
    a.set(FilterField::Country, Some(FilterValue::Text("US".into())));

    let mut b = Filters::new();
    b.set(FilterField::Country, Some(FilterValue::Text("US".into())));
    b.set(FilterField::IsBot, Some(FilterValue::Flag(true)));

    assert_eq!(
      QueryKey::page(Resource::Clicks, 1, 10, a),
      QueryKey::page(Resource::Clicks, 1, 10, b)
    );
    assert_ne!(
      QueryKey::page(Resource::Clicks, 1, 10, Filters::new()),
      QueryKey::page(Resource::Clicks, 2, 10, Filters::new())
    );
  }

  #[test]
  fn test_removing_filter_drops_key() {
    let mut filters = Filters::new();
    assert!(filters.set(FilterField::IsBot, Some(FilterValue::Flag(false))));
    assert!(filters.set(FilterField::IsBot, None));
    assert!(!filters.contains(FilterField::IsBot));
    assert_eq!(filters, Filters::new());
  }

  #[test]
  fn test_empty_text_is_absent() {
    let mut filters = Filters::new();
    filters.set(FilterField::Country, Some(FilterValue::Text("DE".into())));
    assert!(filters.set(FilterField::Country, Some(FilterValue::Text(String::new()))));
    assert!(filters.is_empty());
  }

  #[test]
  fn test_set_same_value_is_unchanged() {
    let mut filters = Filters::new();
    assert!(filters.set(FilterField::Country, Some(FilterValue::Text("US".into()))));
    assert!(!filters.set(FilterField::Country, Some(FilterValue::Text("US".into()))));
    assert!(!filters.set(FilterField::IsBot, None));
  }

  #[test]
  fn test_query_params_order() {
    let mut filters = Filters::new();
    filters.set(FilterField::IsBot, Some(FilterValue::Flag(true)));
    filters.set(FilterField::Country, Some(FilterValue::Text("US".into())));
    assert_eq!(
      filters.query_params(),
      vec![("country", "US".to_string()), ("is_bot", "true".to_string())]
    );
  }

  #[test]
  fn test_display() {
    let key = QueryKey::entity(Resource::LinkStats, 42);
    assert_eq!(key.to_string(), "linkStats[42]");
    assert_eq!(key.resource(), Resource::LinkStats);
  }
}
