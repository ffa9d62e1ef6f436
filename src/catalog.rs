//!
//! flowlens schema catalog
//! -----------------------
//! Immutable description of the queryable flow dimensions and of the
//! dictionaries that enrich them. Built once at startup and shared read-only
//! (behind an `Arc`) by every request; nothing here is mutated afterwards.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::CatalogError;
use crate::ident::{self, DICT_SEPARATOR};
use crate::storage::FlowStore;

/// One queryable dimension of the `flows` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldDescriptor {
    pub name: String,
    pub label: String,
    pub short_label: String,
    /// ClickHouse type used when binding filter values against the column.
    pub column_type: String,
}

impl FieldDescriptor {
    pub fn new(name: &str, label: &str, short_label: &str, column_type: &str) -> Self {
        Self { name: name.into(), label: label.into(), short_label: short_label.into(), column_type: column_type.into() }
    }
}

/// Connects a flow field with a ClickHouse dictionary.
///
/// `expr` is a key expression template with `%s` slots, e.g. `toUInt64(%s)` or
/// `tuple(%s, %s)`. The slots are filled with `keys`, or with the field name
/// itself when `keys` is empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DictBinding {
    pub field: String,
    pub dict: String,
    #[serde(default = "default_key_expr")]
    pub expr: String,
    #[serde(default)]
    pub keys: Vec<String>,
}

fn default_key_expr() -> String { "%s".to_string() }

impl DictBinding {
    /// Number of leading key columns a dictionary description starts with.
    pub fn key_len(&self) -> usize { self.keys.len().max(1) }
}

/// Virtual fields that have no backing column and render as CIDR text.
pub const VIRTUAL_PREFIX_FIELDS: [(&str, &str, &str); 2] = [
    ("src_pfx", "src_prefix_addr", "src_prefix_len"),
    ("dst_pfx", "dst_prefix_addr", "dst_prefix_len"),
];

#[derive(Debug, Clone)]
pub struct Catalog {
    fields: Vec<FieldDescriptor>,
    dicts: Vec<DictBinding>,
}

impl Catalog {
    pub fn new(fields: Vec<FieldDescriptor>, dicts: Vec<DictBinding>) -> Result<Self, CatalogError> {
        let mut seen = HashSet::new();
        for f in &fields {
            if !ident::is_safe_identifier(&f.name) || f.name.contains(DICT_SEPARATOR) {
                return Err(CatalogError::InvalidName(f.name.clone()));
            }
            if !seen.insert(f.name.as_str()) {
                return Err(CatalogError::DuplicateField(f.name.clone()));
            }
        }
        let mut bound = HashSet::new();
        for d in &dicts {
            if !seen.contains(d.field.as_str()) {
                return Err(CatalogError::UnknownDictField { field: d.field.clone(), dict: d.dict.clone() });
            }
            if let Some(k) = d.keys.iter().find(|k| !ident::is_safe_identifier(k)) {
                return Err(CatalogError::InvalidName(k.clone()));
            }
            if !bound.insert(d.field.as_str()) {
                warn!(target: "flowlens::catalog", field = %d.field, dict = %d.dict, "duplicate dict binding; first one wins");
            }
        }
        Ok(Self { fields, dicts })
    }

    /// The fixed flow schema with the given dictionary bindings.
    pub fn flows(dicts: Vec<DictBinding>) -> Result<Self, CatalogError> {
        Self::new(flow_fields(), dicts)
    }

    pub fn fields(&self) -> &[FieldDescriptor] { &self.fields }

    pub fn dicts(&self) -> &[DictBinding] { &self.dicts }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// First binding registered for `field`.
    pub fn dict_for(&self, field: &str) -> Option<&DictBinding> {
        self.dicts.iter().find(|d| d.field == field)
    }

    /// Turn a result column alias into a short, human readable label:
    /// `src_asn` -> `Src.AS`, `src_asn__name` -> `Src.AS.Name`.
    pub fn readable_label(&self, alias: &str) -> String {
        let mut label = alias.to_string();
        if let Some(f) = self.fields.iter().find(|f| alias.starts_with(f.name.as_str())) {
            label = label.replacen(f.name.as_str(), &f.short_label, 1);
        }
        match ident::split_dict_field(&label) {
            (base, Some(sub)) => format!("{}.{}", base, ident::title_case(sub)),
            (_, None) => label,
        }
    }
}

/// Columns of the `flows` table exposed as breakdown/filter fields.
pub fn flow_fields() -> Vec<FieldDescriptor> {
    vec![
        FieldDescriptor::new("agent", "Agent", "A.", "IPv6"),
        FieldDescriptor::new("int_in", "Interface In", "Int.In", "UInt32"),
        FieldDescriptor::new("int_out", "Interface Out", "Int.Out", "UInt32"),
        FieldDescriptor::new("src_addr", "Source IP", "Src.IP", "IPv6"),
        FieldDescriptor::new("src_pfx", "Source IP Prefix", "Src.IP.Pfx", "String"),
        FieldDescriptor::new("dst_addr", "Destination IP", "Dst.IP", "IPv6"),
        FieldDescriptor::new("dst_pfx", "Destination IP Prefix", "Dst.IP.Pfx", "String"),
        FieldDescriptor::new("src_asn", "Source ASN", "Src.AS", "UInt32"),
        FieldDescriptor::new("dst_asn", "Destination ASN", "Dst.AS", "UInt32"),
        FieldDescriptor::new("protocol", "IP Protocol", "IP.Proto", "UInt8"),
        FieldDescriptor::new("src_port", "Source Port", "Src.Port", "UInt16"),
        FieldDescriptor::new("dst_port", "Destination Port", "Dst.Port", "UInt16"),
    ]
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldGroup {
    pub name: String,
    pub label: String,
    pub fields: Vec<FieldOption>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldOption {
    pub name: String,
    pub label: String,
}

/// Selectable fields grouped per flow field, including the attributes of
/// every dictionary bound to it. A dictionary that cannot be described is
/// skipped with a warning; the plain field is always offered.
pub async fn field_groups(catalog: &Catalog, store: &dyn FlowStore) -> Vec<FieldGroup> {
    let mut groups = Vec::with_capacity(catalog.fields().len());
    for field in catalog.fields() {
        let mut fg = FieldGroup {
            name: field.name.clone(),
            label: field.label.clone(),
            fields: vec![FieldOption { name: field.name.clone(), label: field.label.clone() }],
        };
        for d in catalog.dicts().iter().filter(|d| d.field == field.name) {
            let columns = match store.describe_dictionary(&d.dict).await {
                Ok(c) => c,
                Err(e) => {
                    warn!(target: "flowlens::catalog", dict = %d.dict, error = %e, "unable to describe dict; skipping");
                    continue;
                }
            };
            for attr in columns.iter().skip(d.key_len()) {
                fg.fields.push(FieldOption {
                    name: format!("{}{}{}", field.name, DICT_SEPARATOR, attr),
                    label: format!("{} {}", field.label, ident::title_case(attr)),
                });
            }
        }
        groups.push(fg);
    }
    groups
}
