//! Logical field name -> SQL expression.
//!
//! A name is one of
//! - a virtual prefix field (`src_pfx`), rendered as CIDR text from two columns,
//! - a plain column (`src_asn`), emitted as is,
//! - a dictionary attribute (`src_asn__name`), emitted as a `dictGet` call.

use crate::catalog::{Catalog, DictBinding, VIRTUAL_PREFIX_FIELDS};
use crate::error::ResolutionError;
use crate::ident;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Column,
    Virtual,
    Dictionary,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedField {
    pub expr: String,
    pub kind: FieldKind,
}

pub struct FieldResolver<'a> {
    catalog: &'a Catalog,
}

impl<'a> FieldResolver<'a> {
    pub fn new(catalog: &'a Catalog) -> Self { Self { catalog } }

    /// SQL expression for `name`. Plain identifiers come back unchanged.
    pub fn resolve(&self, name: &str) -> Result<String, ResolutionError> {
        self.resolve_field(name).map(|r| r.expr)
    }

    pub fn resolve_field(&self, name: &str) -> Result<ResolvedField, ResolutionError> {
        if let Some(expr) = virtual_field(name) {
            return Ok(ResolvedField { expr, kind: FieldKind::Virtual });
        }
        let (base, sub) = ident::split_dict_field(name);
        if !ident::is_safe_identifier(base) {
            return Err(ResolutionError::InvalidIdentifier(name.to_string()));
        }
        let Some(sub) = sub else {
            return Ok(ResolvedField { expr: base.to_string(), kind: FieldKind::Column });
        };
        if !ident::is_safe_identifier(sub) || sub.contains(ident::DICT_SEPARATOR) {
            return Err(ResolutionError::InvalidIdentifier(name.to_string()));
        }
        let dict = self.catalog.dict_for(base).ok_or_else(|| ResolutionError::MissingDictionary(name.to_string()))?;
        let key = key_expression(dict, base)?;
        Ok(ResolvedField {
            expr: format!("dictGet({}, {}, {})", ident::quote_literal(&dict.dict), ident::quote_literal(sub), key),
            kind: FieldKind::Dictionary,
        })
    }

    /// Like `resolve_field`, but the base field must be in the catalog.
    pub fn resolve_known(&self, name: &str) -> Result<ResolvedField, ResolutionError> {
        let (base, _) = ident::split_dict_field(name);
        if self.catalog.field(base).is_none() {
            return Err(ResolutionError::UnknownField(name.to_string()));
        }
        self.resolve_field(name)
    }
}

fn virtual_field(name: &str) -> Option<String> {
    VIRTUAL_PREFIX_FIELDS
        .iter()
        .find(|(field, _, _)| *field == name)
        .map(|(_, addr, len)| format!("concat(IPv6NumToString({}), '/', toString({}))", addr, len))
}

fn key_expression(dict: &DictBinding, base: &str) -> Result<String, ResolutionError> {
    let args: Vec<&str> = if dict.keys.is_empty() { vec![base] } else { dict.keys.iter().map(String::as_str).collect() };
    fill_template(&dict.expr, &args)
}

/// Substitute `%s` slots in order; `%%` is a literal percent sign.
pub fn fill_template(template: &str, args: &[&str]) -> Result<String, ResolutionError> {
    let mut out = String::with_capacity(template.len() + args.iter().map(|a| a.len()).sum::<usize>());
    let mut slots = 0usize;
    let mut chars = template.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch != '%' {
            out.push(ch);
            continue;
        }
        match chars.peek() {
            Some('s') => {
                chars.next();
                if let Some(a) = args.get(slots) {
                    out.push_str(a);
                }
                slots += 1;
            }
            Some('%') => {
                chars.next();
                out.push('%');
            }
            _ => out.push('%'),
        }
    }
    if slots != args.len() {
        return Err(ResolutionError::KeyTemplate { template: template.to_string(), slots, args: args.len() });
    }
    Ok(out)
}
