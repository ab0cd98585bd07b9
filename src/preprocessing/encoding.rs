//! Кодирование категориальных признаков

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result, SchemaError};
use crate::table::RawTable;

/// Отображение категория -> код для одной колонки
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodingMap {
    pub column: String,
    pub codes: BTreeMap<String, usize>,
}

impl EncodingMap {
    /// Коды назначаются по лексикографическому порядку различных значений
    pub fn fit(column: &str, values: &[&str]) -> Self {
        let distinct: BTreeSet<&str> = values.iter().copied().collect();
        let codes = distinct
            .into_iter()
            .enumerate()
            .map(|(code, value)| (value.to_string(), code))
            .collect();
        Self {
            column: column.to_string(),
            codes,
        }
    }

    pub fn encode(&self, value: &str) -> Result<usize> {
        self.codes
            .get(value)
            .copied()
            .ok_or_else(|| Error::UnseenCategory {
                column: self.column.clone(),
                value: value.to_string(),
            })
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }
}

/// Кодировщик, обучаемый один раз на обучающей выборке
#[derive(Debug, Clone, Default)]
pub struct CategoryEncoder {
    maps: Vec<EncodingMap>,
}

impl CategoryEncoder {
    pub fn new() -> Self {
        Self { maps: Vec::new() }
    }

    pub fn fit(&mut self, table: &RawTable, columns: &[String]) -> std::result::Result<(), SchemaError> {
        let mut maps = Vec::with_capacity(columns.len());
        for column in columns {
            maps.push(EncodingMap::fit(column, &table.column(column)?));
        }
        self.maps = maps;

        tracing::info!("Label mappings are:");
        for map in &self.maps {
            tracing::info!("{}: {:?}", map.column, map.codes);
        }
        Ok(())
    }

    /// Заменяет значения категорий их кодами; остальные колонки не трогает
    pub fn transform(&self, table: &RawTable) -> Result<RawTable> {
        let mut encoded = table.clone();
        for map in &self.maps {
            let idx = table.column_index(&map.column)?;
            for row in encoded.rows.iter_mut() {
                let code = map.encode(&row[idx])?;
                row[idx] = code.to_string();
            }
        }
        Ok(encoded)
    }

    pub fn maps(&self) -> &[EncodingMap] {
        &self.maps
    }

    pub fn into_maps(self) -> Vec<EncodingMap> {
        self.maps
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(values: &[&str]) -> RawTable {
        RawTable::new(
            vec!["room_type_reserved".into(), "lead_time".into()],
            values
                .iter()
                .enumerate()
                .map(|(i, v)| vec![v.to_string(), i.to_string()])
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_codes_follow_sorted_order() {
        let map = EncodingMap::fit("market", &["Online", "Aviation", "Offline", "Online"]);
        assert_eq!(map.encode("Aviation").unwrap(), 0);
        assert_eq!(map.encode("Offline").unwrap(), 1);
        assert_eq!(map.encode("Online").unwrap(), 2);
        assert_eq!(map.len(), 3);
    }

    #[test]
    fn test_fit_is_deterministic() {
        let values = ["Room_Type 4", "Room_Type 1", "Room_Type 6", "Room_Type 1"];
        let mut reversed = values;
        reversed.reverse();

        let first = EncodingMap::fit("room", &values);
        let second = EncodingMap::fit("room", &values);
        let shuffled = EncodingMap::fit("room", &reversed);
        assert_eq!(first, second);
        assert_eq!(first, shuffled);
    }

    #[test]
    fn test_test_split_uses_train_mapping() {
        let columns = vec!["room_type_reserved".to_string()];
        let mut encoder = CategoryEncoder::new();
        encoder.fit(&table(&["B", "A", "C"]), &columns).unwrap();

        let encoded = encoder.transform(&table(&["C", "C", "A"])).unwrap();
        assert_eq!(encoded.column("room_type_reserved").unwrap(), vec!["2", "2", "0"]);
        assert_eq!(encoded.column("lead_time").unwrap(), vec!["0", "1", "2"]);
    }

    #[test]
    fn test_unseen_category_is_error() {
        let columns = vec!["room_type_reserved".to_string()];
        let mut encoder = CategoryEncoder::new();
        encoder.fit(&table(&["A", "B"]), &columns).unwrap();

        let err = encoder.transform(&table(&["A", "Z"])).unwrap_err();
        assert!(matches!(err, Error::UnseenCategory { ref value, .. } if value == "Z"));
    }

    #[test]
    fn test_missing_categorical_column() {
        let mut encoder = CategoryEncoder::new();
        let err = encoder
            .fit(&table(&["A"]), &["market_segment_type".to_string()])
            .unwrap_err();
        assert!(matches!(err, SchemaError::MissingColumn { .. }));
    }
}
