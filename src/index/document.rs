use crate::error::{Result, SearchError};
use crate::index::fields::DataType;
use crate::index::IndexHandle;
use crate::query::values;
use crate::types::FieldData;
use tantivy::schema::OwnedValue;
use tantivy::TantivyDocument;

/// Turn one entry into a tantivy document.
///
/// Values are coerced with the same rules the query compiler applies to
/// condition values, so a value written here is matched by an equal value in
/// a search condition.
pub fn build_document(
    index: &IndexHandle,
    entry_id: &str,
    return_id: &str,
    fields: &[FieldData],
) -> Result<TantivyDocument> {
    if entry_id.is_empty() {
        return Err(SearchError::InvalidDocument(
            "entry id must not be empty".to_string(),
        ));
    }

    let mut doc = TantivyDocument::new();
    doc.add_text(index.entry_id_field(), entry_id);
    doc.add_text(index.return_id_field(), return_id);

    for data in fields {
        let def = index
            .def(&data.name)
            .ok_or_else(|| SearchError::FieldNotFound(data.name.clone()))?;
        let field = index.field(&def.name)?;
        let name = def.name.as_str();
        let value = data.value.as_str();

        match def.data_type {
            DataType::Text | DataType::Name => {
                doc.add_text(field, value);
                if def.sortable {
                    let sort_field = index.field(&def.sort_field_name())?;
                    doc.add_text(sort_field, index.analyzer().fold(value));
                }
            }
            DataType::Identifier => doc.add_text(field, value),
            DataType::Index => doc.add_text(field, index.analyzer().fold(value)),
            DataType::Boolean => doc.add_text(field, values::boolean_term(value)),
            DataType::Date => {
                let date = values::normalize_date(name, value)?;
                doc.add_i64(field, values::to_numeric(name, &date)?);
            }
            DataType::Time | DataType::Timestamp => {
                doc.add_i64(field, values::to_numeric(name, value)?);
            }
            DataType::Integer => doc.add_i64(field, values::parse_integer(name, value)?),
            DataType::Decimal => doc.add_f64(field, values::parse_decimal(name, value)?),
        }
    }

    Ok(doc)
}

/// Render a stored value the way hits report it.
pub fn stored_to_string(value: &OwnedValue) -> Option<String> {
    match value {
        OwnedValue::Str(s) => Some(s.clone()),
        OwnedValue::I64(i) => Some(i.to_string()),
        OwnedValue::U64(u) => Some(u.to_string()),
        OwnedValue::F64(f) => Some(f.to_string()),
        OwnedValue::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::fields::FieldDefinition;
    use crate::tokenizer::Analyzer;
    use tantivy::schema::Value;

    fn handle() -> IndexHandle {
        IndexHandle::in_memory(
            "metadata",
            &[
                FieldDefinition::new("title", DataType::Text).sortable(),
                FieldDefinition::new("shelfmark", DataType::Index),
                FieldDefinition::new("public", DataType::Boolean),
                FieldDefinition::new("created", DataType::Date),
                FieldDefinition::new("price", DataType::Decimal),
            ],
            Analyzer::default(),
        )
        .unwrap()
    }

    fn first_str(doc: &TantivyDocument, index: &IndexHandle, name: &str) -> String {
        let field = index.field(name).unwrap();
        doc.get_first(field)
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap()
    }

    #[test]
    fn test_typed_values() {
        let index = handle();
        let doc = build_document(
            &index,
            "obj_1",
            "obj_1",
            &[
                FieldData::new("title", "Über Häuser"),
                FieldData::new("shelfmark", "Mü 12"),
                FieldData::new("public", "true"),
                FieldData::new("created", "2020-05-17T10:00:00Z"),
                FieldData::new("price", "3,5"),
            ],
        )
        .unwrap();

        assert_eq!(first_str(&doc, &index, "mcrid"), "obj_1");
        assert_eq!(first_str(&doc, &index, "title"), "Über Häuser");
        assert_eq!(first_str(&doc, &index, "title_sort"), "uber hauser");
        assert_eq!(first_str(&doc, &index, "shelfmark"), "mu 12");
        assert_eq!(first_str(&doc, &index, "public"), "1");

        let created = doc.get_first(index.field("created").unwrap()).unwrap();
        assert_eq!(
            created.as_i64(),
            Some(values::to_numeric("created", "2020-05-17").unwrap())
        );
        let price = doc.get_first(index.field("price").unwrap()).unwrap();
        assert_eq!(price.as_f64(), Some(3.5));
    }

    #[test]
    fn test_rejects_unknown_field_and_bad_value() {
        let index = handle();
        assert!(matches!(
            build_document(&index, "obj_1", "obj_1", &[FieldData::new("nope", "x")]),
            Err(SearchError::FieldNotFound(_))
        ));
        assert!(matches!(
            build_document(&index, "obj_1", "obj_1", &[FieldData::new("created", "soon")]),
            Err(SearchError::InvalidValue { .. })
        ));
        assert!(matches!(
            build_document(&index, "", "obj_1", &[]),
            Err(SearchError::InvalidDocument(_))
        ));
    }

    #[test]
    fn test_stored_to_string() {
        assert_eq!(stored_to_string(&OwnedValue::I64(42)).as_deref(), Some("42"));
        assert_eq!(
            stored_to_string(&OwnedValue::Str("x".to_string())).as_deref(),
            Some("x")
        );
        assert_eq!(stored_to_string(&OwnedValue::Null), None);
    }
}
