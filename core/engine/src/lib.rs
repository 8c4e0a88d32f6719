//! FILENAME: core/engine/src/lib.rs
//! PURPOSE: Main library entry point for the data-cube engine.
//! CONTEXT: Re-exports the lazy sequence engine and the atom/dimension model
//! used by the grouping and translation crates.

pub mod atom;
pub mod complex_type;
pub mod date;
pub mod datum;
pub mod dimension;
pub mod error;
pub mod query;

// Re-export commonly used types at the crate root
pub use atom::{Atom, AtomId, AtomValue, OrderedFloat, RawValue, ATOM_ID_NULL};
pub use complex_type::{
    escape_key_part, join_key_parts, ComplexType, DEFAULT_KEY_SEPARATOR, DEFAULT_LABEL_SEPARATOR,
};
pub use date::CalendarDate;
pub use datum::{AtomRow, Datum, DatumFlag, DatumId, DatumStates};
pub use dimension::{AtomCodec, Dimension, DimensionType, ValueType};
pub use error::{CubeError, CubeResult};
pub use query::{from_iter, from_slice, from_vec, Query, ValueRange};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_interns_through_the_schema() {
        let mut schema = ComplexType::new();
        let index = schema
            .add_dimension(DimensionType::new("city", ValueType::String))
            .unwrap();
        let dim = schema.dimension_at_mut(index).unwrap();
        let a = dim.intern(&RawValue::from("London"));
        let b = dim.intern(&RawValue::from("London"));
        assert_eq!(a, b);
    }

    #[test]
    fn it_queries_dimension_atoms() {
        let mut dim = Dimension::new(0, DimensionType::new("qty", ValueType::Number));
        for n in [72.0, 50.0, 27.0, 80.0] {
            dim.intern(&RawValue::Number(n));
        }
        let range = from_slice(dim.atoms())
            .map(|atom| atom.value.as_number().unwrap_or(0.0))
            .range()
            .unwrap();
        assert_eq!(range, ValueRange { min: 27.0, max: 80.0 });
    }
}
