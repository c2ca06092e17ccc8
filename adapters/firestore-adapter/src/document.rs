//! Mapping between domain types and Firestore REST documents.
//!
//! Field names match the collections already in production so existing data
//! keeps loading: `nombre`, `sitio`, `cantidad`, `comprado`, `fechaRegistro`.

use std::time::SystemTime;

use chrono::{DateTime, SecondsFormat, Utc};
use domain::{CoreError, DocumentId, NewProduct, NewSite, Product, ShoppingList, Site};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

pub const FIELD_ID: &str = "id";
pub const FIELD_NAME: &str = "nombre";
pub const FIELD_SITE: &str = "sitio";
pub const FIELD_QUANTITY: &str = "cantidad";
pub const FIELD_PURCHASED: &str = "comprado";
pub const FIELD_REGISTERED_AT: &str = "fechaRegistro";

/// Every field written for a product; used as the update mask so cleared
/// optional fields are removed from the stored document.
pub const PRODUCT_FIELDS: [&str; 5] = [
    FIELD_ID,
    FIELD_NAME,
    FIELD_SITE,
    FIELD_QUANTITY,
    FIELD_PURCHASED,
];

pub type Fields = Map<String, Value>;

/// A Firestore document as returned by the REST API. Values stay as raw JSON
/// so unknown value kinds (maps, arrays, references) do not break decoding.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Document {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub fields: Fields,
}

impl Document {
    pub fn from_fields(fields: Fields) -> Self {
        Self { name: None, fields }
    }

    /// Last segment of the resource name, i.e. the document id.
    pub fn name_id(&self) -> Option<&str> {
        self.name
            .as_deref()
            .and_then(|n| n.rsplit('/').next())
            .filter(|s| !s.is_empty())
    }
}

/// Response page of `documents.list`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListDocumentsPage {
    #[serde(default)]
    pub documents: Vec<Document>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

/// One streamed element of a `:runQuery` response.
#[derive(Debug, Default, Deserialize)]
pub struct RunQueryItem {
    #[serde(default)]
    pub document: Option<Document>,
}

/// Structured query over a root collection, newest `fechaRegistro` first.
pub fn newest_lists_query(collection: &str, limit: usize) -> Value {
    json!({
        "structuredQuery": {
            "from": [{ "collectionId": collection }],
            "orderBy": [{
                "field": { "fieldPath": FIELD_REGISTERED_AT },
                "direction": "DESCENDING"
            }],
            "limit": limit
        }
    })
}

pub fn string_value(s: &str) -> Value {
    json!({ "stringValue": s })
}

pub fn bool_value(b: bool) -> Value {
    json!({ "booleanValue": b })
}

/// Integers travel as decimal strings in the REST encoding.
pub fn integer_value(n: i64) -> Value {
    json!({ "integerValue": n.to_string() })
}

pub fn timestamp_value(t: SystemTime) -> Value {
    let dt: DateTime<Utc> = t.into();
    json!({ "timestampValue": dt.to_rfc3339_opts(SecondsFormat::Millis, true) })
}

fn get_string(fields: &Fields, name: &str) -> Option<String> {
    fields
        .get(name)?
        .get("stringValue")?
        .as_str()
        .map(str::to_string)
}

fn get_bool(fields: &Fields, name: &str) -> Option<bool> {
    fields.get(name)?.get("booleanValue")?.as_bool()
}

fn get_integer(fields: &Fields, name: &str) -> Option<i64> {
    let v = fields.get(name)?;
    if let Some(raw) = v.get("integerValue") {
        return match raw {
            Value::String(s) => s.parse().ok(),
            other => other.as_i64(),
        };
    }
    // Web clients write plain JS numbers, which may arrive as doubles.
    v.get("doubleValue")?.as_f64().map(|f| f as i64)
}

fn get_timestamp(fields: &Fields, name: &str) -> Option<SystemTime> {
    let raw = fields.get(name)?.get("timestampValue")?.as_str()?;
    let dt = DateTime::parse_from_rfc3339(raw).ok()?;
    Some(dt.with_timezone(&Utc).into())
}

fn malformed(what: &str) -> CoreError {
    CoreError::Repository(format!("malformed document: {what}"))
}

/// The stored `id` field wins; documents written before it existed fall
/// back to the resource name.
fn document_id(doc: &Document) -> Result<DocumentId, CoreError> {
    let raw = get_string(&doc.fields, FIELD_ID)
        .filter(|s| !s.is_empty())
        .or_else(|| doc.name_id().map(str::to_string))
        .ok_or_else(|| malformed("missing id"))?;
    DocumentId::new(raw).map_err(|e| malformed(&e.to_string()))
}

pub fn new_product_to_fields(p: &NewProduct) -> Fields {
    let mut fields = Fields::new();
    fields.insert(FIELD_NAME.into(), string_value(&p.name));
    if let Some(site) = &p.site {
        fields.insert(FIELD_SITE.into(), string_value(site));
    }
    if let Some(q) = p.quantity {
        fields.insert(FIELD_QUANTITY.into(), integer_value(q as i64));
    }
    fields.insert(FIELD_PURCHASED.into(), bool_value(p.purchased));
    fields
}

pub fn product_to_fields(p: &Product) -> Fields {
    let mut fields = new_product_to_fields(&NewProduct {
        name: p.name.clone(),
        site: p.site.clone(),
        quantity: p.quantity,
        purchased: p.purchased,
    });
    fields.insert(FIELD_ID.into(), string_value(p.id.as_str()));
    fields
}

pub fn document_to_product(doc: &Document) -> Result<Product, CoreError> {
    Ok(Product {
        id: document_id(doc)?,
        name: get_string(&doc.fields, FIELD_NAME).unwrap_or_default(),
        site: get_string(&doc.fields, FIELD_SITE).filter(|s| !s.is_empty()),
        quantity: get_integer(&doc.fields, FIELD_QUANTITY)
            .and_then(|q| u32::try_from(q).ok())
            .filter(|q| *q > 0),
        purchased: get_bool(&doc.fields, FIELD_PURCHASED).unwrap_or(false),
    })
}

pub fn list_to_fields(list: &ShoppingList) -> Fields {
    let mut fields = Fields::new();
    fields.insert(
        FIELD_REGISTERED_AT.into(),
        timestamp_value(list.registered_at),
    );
    fields
}

pub fn document_to_list(doc: &Document) -> Result<ShoppingList, CoreError> {
    let id = doc
        .name_id()
        .ok_or_else(|| malformed("list without name"))
        .and_then(|s| DocumentId::new(s).map_err(|e| malformed(&e.to_string())))?;
    let registered_at = get_timestamp(&doc.fields, FIELD_REGISTERED_AT)
        .ok_or_else(|| malformed("list without fechaRegistro"))?;
    Ok(ShoppingList { id, registered_at })
}

pub fn new_site_to_fields(site: &NewSite) -> Fields {
    let mut fields = Fields::new();
    fields.insert(FIELD_NAME.into(), string_value(&site.name));
    fields
}

pub fn document_to_site(doc: &Document) -> Result<Site, CoreError> {
    Ok(Site {
        id: document_id(doc)?,
        name: get_string(&doc.fields, FIELD_NAME).unwrap_or_default(),
    })
}

/// Single-field payload used to stamp the generated id into a new document.
pub fn id_fields(id: &str) -> Fields {
    let mut fields = Fields::new();
    fields.insert(FIELD_ID.into(), string_value(id));
    fields
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, UNIX_EPOCH};

    fn doc(name: &str, fields: Value) -> Document {
        serde_json::from_value(json!({ "name": name, "fields": fields })).unwrap()
    }

    #[test]
    fn product_fields_roundtrip() {
        let p = Product {
            id: DocumentId::new("abc").unwrap(),
            name: "Rice".into(),
            site: Some("Market".into()),
            quantity: Some(3),
            purchased: true,
        };
        let d = Document::from_fields(product_to_fields(&p));
        assert_eq!(d.fields[FIELD_QUANTITY], json!({"integerValue": "3"}));
        assert_eq!(document_to_product(&d).unwrap(), p);
    }

    #[test]
    fn legacy_product_without_id_field_uses_name() {
        let d = doc(
            "projects/p/databases/(default)/documents/listacompras/l1/elementoslista/XyZ",
            json!({ "nombre": {"stringValue": "Tea"}, "cantidad": {"doubleValue": 2.0} }),
        );
        let p = document_to_product(&d).unwrap();
        assert_eq!(p.id.as_str(), "XyZ");
        assert_eq!(p.quantity, Some(2));
        assert!(!p.purchased);
        assert_eq!(p.site, None);
    }

    #[test]
    fn unknown_value_kinds_are_ignored() {
        let d = doc(
            "projects/p/databases/(default)/documents/sitios/s1",
            json!({
                "nombre": {"stringValue": "Mall"},
                "tags": {"arrayValue": {"values": [{"stringValue": "x"}]}}
            }),
        );
        let s = document_to_site(&d).unwrap();
        assert_eq!(s.id.as_str(), "s1");
        assert_eq!(s.name, "Mall");
    }

    #[test]
    fn list_timestamp_roundtrip() {
        let list = ShoppingList {
            id: DocumentId::new("primeralista").unwrap(),
            registered_at: UNIX_EPOCH + Duration::from_millis(1_700_000_000_123),
        };
        let mut d = Document::from_fields(list_to_fields(&list));
        d.name = Some("projects/p/databases/(default)/documents/listacompras/primeralista".into());
        assert_eq!(document_to_list(&d).unwrap(), list);
    }

    #[test]
    fn list_without_timestamp_is_malformed() {
        let d = doc("projects/p/databases/(default)/documents/listacompras/x", json!({}));
        assert!(matches!(document_to_list(&d), Err(CoreError::Repository(_))));
    }

    #[test]
    fn newest_query_shape() {
        let q = newest_lists_query("listacompras", 1);
        let sq = &q["structuredQuery"];
        assert_eq!(sq["from"][0]["collectionId"], "listacompras");
        assert_eq!(sq["orderBy"][0]["field"]["fieldPath"], FIELD_REGISTERED_AT);
        assert_eq!(sq["orderBy"][0]["direction"], "DESCENDING");
        assert_eq!(sq["limit"], 1);
    }

    #[test]
    fn run_query_items_without_document_are_skipped() {
        let items: Vec<RunQueryItem> =
            serde_json::from_value(json!([{ "readTime": "2024-01-01T00:00:00Z" }])).unwrap();
        assert!(items[0].document.is_none());
    }
}
