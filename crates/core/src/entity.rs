//! Indexable entity declarations and ordering-property selection.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::key::{EntityKey, KeyKind, KeyValue};

/// A named scalar property
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyProperty {
  pub property: String,
  pub kind: KeyKind,
}

/// One field of a composite key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyField {
  pub name: String,
  pub kind: KeyKind,
}

/// A composite (embedded) primary key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompositeKey {
  /// Name of the embedded key property on the entity
  pub property: String,
  pub fields: Vec<KeyField>,
  /// Surrogate unique identifier usable for simple ordering comparisons
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub surrogate: Option<KeyProperty>,
}

/// Declaration of an indexable entity type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityDescriptor {
  pub name: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub primary_key: Option<KeyProperty>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub composite_key: Option<CompositeKey>,
}

/// Property driving the cursor of a bulk scan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderingProperty {
  /// Simple top-level scalar; supports server-side cursoring
  Scalar { name: String, kind: KeyKind },
  /// Nested inside a composite key; no reliable cursor
  Composite { name: String },
}

impl OrderingProperty {
  pub fn name(&self) -> &str {
    match self {
      OrderingProperty::Scalar { name, .. } | OrderingProperty::Composite { name } => name,
    }
  }

  pub fn kind(&self) -> Option<KeyKind> {
    match self {
      OrderingProperty::Scalar { kind, .. } => Some(*kind),
      OrderingProperty::Composite { .. } => None,
    }
  }

  pub fn is_composite(&self) -> bool {
    matches!(self, OrderingProperty::Composite { .. })
  }
}

impl EntityDescriptor {
  pub fn simple(name: impl Into<String>, property: impl Into<String>, kind: KeyKind) -> Self {
    Self {
      name: name.into(),
      primary_key: Some(KeyProperty {
        property: property.into(),
        kind,
      }),
      composite_key: None,
    }
  }

  pub fn composite(name: impl Into<String>, key: CompositeKey) -> Self {
    Self {
      name: name.into(),
      primary_key: None,
      composite_key: Some(key),
    }
  }

  /// Select the ordering property for bulk scans.
  ///
  /// The natural primary key wins. A composite key defers to its surrogate
  /// identifier when one is declared, otherwise the composite property itself
  /// is used and scans fall back to a full unordered load. No key at all is a
  /// configuration error.
  pub fn ordering_property(&self) -> Result<OrderingProperty> {
    if let Some(pk) = &self.primary_key {
      return Ok(OrderingProperty::Scalar {
        name: pk.property.clone(),
        kind: pk.kind,
      });
    }

    if let Some(composite) = &self.composite_key {
      if let Some(surrogate) = &composite.surrogate {
        return Ok(OrderingProperty::Scalar {
          name: surrogate.property.clone(),
          kind: surrogate.kind,
        });
      }
      return Ok(OrderingProperty::Composite {
        name: composite.property.clone(),
      });
    }

    Err(Error::configuration(format!(
      "entity '{}' has no primary key or ordering property",
      self.name
    )))
  }

  /// Parse a primary key from its command-line form.
  ///
  /// Simple keys take the raw value; composite keys take `field=value` pairs
  /// separated by commas.
  pub fn parse_key(&self, text: &str) -> Result<EntityKey> {
    if let Some(pk) = &self.primary_key {
      return Ok(EntityKey::Single(KeyValue::parse(pk.kind, text)?));
    }

    let composite = self
      .composite_key
      .as_ref()
      .ok_or_else(|| Error::configuration(format!("entity '{}' has no primary key", self.name)))?;

    let mut fields = BTreeMap::new();
    for pair in text.split(',').map(str::trim).filter(|p| !p.is_empty()) {
      let (name, value) = pair
        .split_once('=')
        .ok_or_else(|| Error::invalid_key(format!("expected field=value, got '{}'", pair)))?;
      let field = composite
        .fields
        .iter()
        .find(|f| f.name == name.trim())
        .ok_or_else(|| Error::invalid_key(format!("unknown key field '{}' for {}", name, self.name)))?;
      fields.insert(field.name.clone(), KeyValue::parse(field.kind, value.trim())?);
    }

    if fields.len() != composite.fields.len() {
      return Err(Error::invalid_key(format!(
        "{} key needs fields: {}",
        self.name,
        composite
          .fields
          .iter()
          .map(|f| f.name.as_str())
          .collect::<Vec<_>>()
          .join(", ")
      )));
    }

    Ok(EntityKey::Composite(fields))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn order_line(surrogate: bool) -> EntityDescriptor {
    EntityDescriptor::composite(
      "OrderLine",
      CompositeKey {
        property: "id".into(),
        fields: vec![
          KeyField {
            name: "order".into(),
            kind: KeyKind::Long,
          },
          KeyField {
            name: "line".into(),
            kind: KeyKind::Int,
          },
        ],
        surrogate: surrogate.then(|| KeyProperty {
          property: "uuid".into(),
          kind: KeyKind::Uuid,
        }),
      },
    )
  }

  #[test]
  fn test_ordering_prefers_primary_key() {
    let d = EntityDescriptor::simple("Customer", "id", KeyKind::Long);
    assert_eq!(
      d.ordering_property().unwrap(),
      OrderingProperty::Scalar {
        name: "id".into(),
        kind: KeyKind::Long
      }
    );
  }

  #[test]
  fn test_ordering_uses_surrogate_for_composite_key() {
    let ordering = order_line(true).ordering_property().unwrap();
    assert_eq!(ordering.name(), "uuid");
    assert_eq!(ordering.kind(), Some(KeyKind::Uuid));
  }

  #[test]
  fn test_ordering_falls_back_to_composite() {
    let ordering = order_line(false).ordering_property().unwrap();
    assert!(ordering.is_composite());
    assert_eq!(ordering.name(), "id");
  }

  #[test]
  fn test_no_key_is_configuration_error() {
    let d = EntityDescriptor {
      name: "Orphan".into(),
      primary_key: None,
      composite_key: None,
    };
    assert!(matches!(d.ordering_property(), Err(Error::Configuration(_))));
  }

  #[test]
  fn test_parse_composite_key() {
    let key = order_line(false).parse_key("order=10, line=2").unwrap();
    assert_eq!(
      key,
      EntityKey::composite([("order", KeyValue::Long(10)), ("line", KeyValue::Int(2))])
    );
    assert!(order_line(false).parse_key("order=10").is_err());
    assert!(order_line(false).parse_key("order=10,qty=1").is_err());
  }
}
