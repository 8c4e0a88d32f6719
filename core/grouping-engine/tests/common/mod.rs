//! FILENAME: tests/common/mod.rs
//! Fixtures for grouping-engine integration tests.

#![allow(dead_code)]

use cube_engine::query::{from_vec, Query};
use cube_engine::{AtomRow, ComplexType, DimensionType, RawValue, ValueType};
use grouping_engine::{Data, NodeId};

/// City sales: (city, date, qty), in load order.
pub struct SalesFixture;

impl SalesFixture {
    pub fn rows() -> Vec<(&'static str, &'static str, f64)> {
        vec![
            ("London", "2011-06-05", 72.0),
            ("London", "2011-06-12", 50.0),
            ("Paris", "2011-06-05", 27.0),
            ("Paris", "2011-06-12", 80.0),
        ]
    }

    pub fn schema() -> ComplexType {
        ComplexType::from_types([
            DimensionType::new("city", ValueType::String),
            DimensionType::new("date", ValueType::Date),
            DimensionType::new("qty", ValueType::Number),
        ])
        .unwrap()
    }

    pub fn data() -> Data {
        let mut data = Data::new(Self::schema());
        let rows: Vec<AtomRow> = Self::rows()
            .into_iter()
            .map(|(city, date, qty)| {
                vec![
                    (0, RawValue::from(city)),
                    (1, RawValue::from(date)),
                    (2, RawValue::Number(qty)),
                ]
            })
            .collect();
        data.load(from_vec(rows)).unwrap();
        data
    }
}

/// Keys of a node's children, in order.
pub fn child_keys(data: &Data, node: NodeId) -> Vec<String> {
    data.children(node)
        .unwrap()
        .map(|id| data.node(id).unwrap().key().to_string())
        .to_array()
}

/// Absolute keys of a node's leafs, in order.
pub fn leaf_keys(data: &Data, node: NodeId) -> Vec<String> {
    data.leafs(node)
        .unwrap()
        .map(|id| data.node(id).unwrap().absolute_key().to_string())
        .to_array()
}

/// Sum of one numeric dimension over a node's datums.
pub fn sum(data: &Data, node: NodeId, dimension: &str) -> f64 {
    let index = data.dimension(dimension).unwrap().index;
    let dim = data.dimension(dimension).unwrap();
    data.datums(node)
        .unwrap()
        .sum_by(|datum| {
            dim.atom(datum.atom(index))
                .and_then(|atom| atom.value.as_number())
                .unwrap_or(0.0)
        })
}
