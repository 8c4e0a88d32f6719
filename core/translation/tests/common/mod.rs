//! FILENAME: tests/common/mod.rs
//! Fixtures for translation integration tests.

#![allow(dead_code)]

use cube_engine::{ComplexType, RawValue};
use grouping_engine::Data;
use translation::{
    ColumnMetadata, ColumnType, RelationalSource, SourceTranslation, Translation,
    TranslationOptions,
};

/// Weekly city sales with a numeric measure and a date.
pub struct SalesFixture;

impl SalesFixture {
    pub fn metadata() -> Vec<ColumnMetadata> {
        vec![
            ColumnMetadata::new("City", ColumnType::String),
            ColumnMetadata::new("Week", ColumnType::Date),
            ColumnMetadata::new("Qty", ColumnType::Numeric),
        ]
    }

    pub fn rows() -> Vec<Vec<RawValue>> {
        vec![
            vec![RawValue::from("London"), RawValue::from("2011-06-05"), RawValue::from(72.0)],
            vec![RawValue::from("London"), RawValue::from("2011-06-12"), RawValue::from(50.0)],
            vec![RawValue::from("Paris"), RawValue::from("2011-06-05"), RawValue::from(27.0)],
            vec![RawValue::from("Paris"), RawValue::from("2011-06-12"), RawValue::from(80.0)],
        ]
    }

    pub fn source() -> RelationalSource {
        RelationalSource::new(Self::metadata(), Self::rows())
    }
}

/// Translates a source into a fresh schema and loads it.
pub fn load<S: SourceTranslation>(source: &S, options: TranslationOptions) -> Data {
    let mut schema = ComplexType::new();
    let plan = Translation::new(source, options)
        .prepare(&mut schema)
        .unwrap();
    let mut data = Data::new(schema);
    data.load(plan.rows()).unwrap();
    data
}
