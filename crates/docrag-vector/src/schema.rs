use arrow_schema::{DataType, Field, Schema};
use std::sync::Arc;

use docrag_core::{Error, Result};

pub const META_TABLE: &str = "meta";

/// Arrow schema of a collection whose vectors have `dim` components.
///
/// `seq` is the insertion sequence number used to break distance ties.
pub fn build_records_schema(dim: usize) -> Result<Arc<Schema>> {
    let width = i32::try_from(dim)
        .map_err(|_| Error::InvalidConfiguration(format!("vector width {dim} exceeds {}", i32::MAX)))?;
    Ok(Arc::new(Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new("seq", DataType::Int64, false),
        Field::new("text", DataType::Utf8, false),
        Field::new("source", DataType::Utf8, false),
        Field::new("source_path", DataType::Utf8, false),
        Field::new("position_index", DataType::Int32, false),
        Field::new("total_chunks", DataType::Int32, false),
        Field::new("vector", DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), width), true),
    ])))
}

pub fn build_meta_schema() -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("key", DataType::Utf8, false),
        Field::new("value", DataType::Utf8, false),
        Field::new("updated_at", DataType::Timestamp(arrow_schema::TimeUnit::Millisecond, None), false),
    ]))
}

/// Vector length fixed by a collection schema, if it has a vector column.
pub fn vector_dim(schema: &Schema) -> Option<usize> {
    match schema.field_with_name("vector").ok()?.data_type() {
        DataType::FixedSizeList(_, n) => usize::try_from(*n).ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vector_dim_reads_fixed_size() {
        assert_eq!(vector_dim(&build_records_schema(768).unwrap()), Some(768));
        assert_eq!(vector_dim(&build_meta_schema()), None);
    }

    #[test]
    fn width_beyond_i32_is_rejected() {
        let too_wide = i32::MAX as usize + 1;
        assert!(matches!(build_records_schema(too_wide), Err(Error::InvalidConfiguration(_))));
    }
}
