use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::{ReportError, ReportResult};

/// A book record in the collection.
///
/// Every attribute is optional; the store does not enforce a schema and
/// absent attributes decode as `None`. Attributes this type does not know
/// about are kept in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Book {
    /// Store identity key, carried opaquely
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub genre: Option<String>,

    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "integral"
    )]
    pub published_year: Option<i64>,

    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "decimal"
    )]
    pub price: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_stock: Option<bool>,

    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "integral"
    )]
    pub pages: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publisher: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Book {
    pub fn new(
        title: impl Into<String>,
        author: impl Into<String>,
        genre: impl Into<String>,
        published_year: i64,
        price: f64,
        in_stock: bool,
    ) -> Self {
        Self {
            title: Some(title.into()),
            author: Some(author.into()),
            genre: Some(genre.into()),
            published_year: Some(published_year),
            price: Some(price),
            in_stock: Some(in_stock),
            ..Self::default()
        }
    }

    pub fn with_pages(mut self, pages: i64) -> Self {
        self.pages = Some(pages);
        self
    }

    pub fn with_publisher(mut self, publisher: impl Into<String>) -> Self {
        self.publisher = Some(publisher.into());
        self
    }

    pub fn to_value(&self) -> ReportResult<Value> {
        Ok(serde_json::to_value(self)?)
    }
}

/// `{title, price}` row of the price listings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TitlePrice {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "decimal")]
    pub price: Option<f64>,
}

/// Average price per genre. `genre` is `None` for books without a genre.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenreAverage {
    #[serde(rename(deserialize = "_id"))]
    pub genre: Option<String>,
    #[serde(rename(deserialize = "avgPrice"), default, deserialize_with = "decimal")]
    pub avg_price: Option<f64>,
    #[serde(deserialize_with = "count")]
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorCount {
    #[serde(rename(deserialize = "_id"))]
    pub author: Option<String>,
    #[serde(deserialize_with = "count")]
    pub count: u64,
}

/// Books per publication decade. `decade` is `None` for books without a
/// year.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecadeCount {
    #[serde(rename(deserialize = "_id"), deserialize_with = "integral")]
    pub decade: Option<i64>,
    #[serde(deserialize_with = "count")]
    pub count: u64,
}

/// Decode a list of store records into typed rows.
pub fn decode_rows<T>(rows: Vec<Value>) -> ReportResult<Vec<T>>
where
    T: for<'de> Deserialize<'de>,
{
    rows.into_iter()
        .map(|row| {
            serde_json::from_value(row).map_err(|e| ReportError::Decode(e.to_string()))
        })
        .collect()
}

/// Whole-valued numbers may come back as doubles (arithmetic stages always
/// produce doubles); accept those as integers.
fn integral<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => {
            if let Some(i) = n.as_i64() {
                return Ok(Some(i));
            }
            match n.as_f64() {
                Some(f) if f.fract() == 0.0 && f.is_finite() => Ok(Some(f as i64)),
                _ => Err(serde::de::Error::custom(format!(
                    "expected an integral number, got {}",
                    n
                ))),
            }
        }
        Some(other) => Err(serde::de::Error::custom(format!(
            "expected a number, got {}",
            other
        ))),
    }
}

/// Prices stored as Decimal128 arrive as `{"$numberDecimal": "19.99"}` in
/// extended JSON.
fn decimal<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_f64()
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("number {} out of range", n))),
        Some(Value::Object(map)) => match map.get("$numberDecimal") {
            Some(Value::String(s)) if map.len() == 1 => s
                .parse::<f64>()
                .map(Some)
                .map_err(|_| serde::de::Error::custom(format!("invalid decimal '{}'", s))),
            _ => Err(serde::de::Error::custom(format!(
                "expected a number, got {}",
                Value::Object(map)
            ))),
        },
        Some(other) => Err(serde::de::Error::custom(format!(
            "expected a number, got {}",
            other
        ))),
    }
}

fn count<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    match integral(deserializer)? {
        Some(n) if n >= 0 => Ok(n as u64),
        Some(n) => Err(serde::de::Error::custom(format!("negative count {}", n))),
        None => Err(serde::de::Error::custom("missing count")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_book_tolerates_missing_and_extra_fields() {
        let book: Book = serde_json::from_value(json!({
            "_id": {"$oid": "65f0c0ffee0000000000000a"},
            "title": "The Last Algorithm",
            "published_year": 2019.0,
            "isbn": "978-0000000000"
        }))
        .unwrap();
        assert_eq!(book.title.as_deref(), Some("The Last Algorithm"));
        assert_eq!(book.published_year, Some(2019));
        assert_eq!(book.author, None);
        assert_eq!(book.extra.get("isbn"), Some(&json!("978-0000000000")));
        assert!(book.id.is_some());
    }

    #[test]
    fn test_decimal_prices_decode() {
        let book: Book = serde_json::from_value(json!({
            "title": "The Last Algorithm",
            "price": {"$numberDecimal": "19.99"}
        }))
        .unwrap();
        assert_eq!(book.price, Some(19.99));

        let rows: Vec<TitlePrice> = decode_rows(vec![
            json!({"title": "A", "price": {"$numberDecimal": "8.50"}}),
            json!({"title": "B", "price": 12}),
            json!({"title": "C"}),
        ])
        .unwrap();
        let prices: Vec<_> = rows.iter().map(|r| r.price).collect();
        assert_eq!(prices, vec![Some(8.5), Some(12.0), None]);

        let genres: Vec<GenreAverage> = decode_rows(vec![json!({
            "_id": "Fiction",
            "avgPrice": {"$numberDecimal": "14.2"},
            "count": 5
        })])
        .unwrap();
        assert_eq!(genres[0].avg_price, Some(14.2));

        let bad = decode_rows::<TitlePrice>(vec![json!({"price": {"$numberDecimal": "abc"}})]);
        assert!(matches!(bad, Err(ReportError::Decode(_))));
    }

    #[test]
    fn test_book_rejects_fractional_year() {
        let result: Result<Book, _> = serde_json::from_value(json!({"published_year": 2019.5}));
        assert!(result.is_err());
    }

    #[test]
    fn test_book_serializes_without_absent_fields() {
        let book = Book::new("Dune", "Frank Herbert", "Science Fiction", 1965, 9.99, true);
        let value = book.to_value().unwrap();
        assert_eq!(value["title"], json!("Dune"));
        assert!(value.get("_id").is_none());
        assert!(value.get("pages").is_none());
    }

    #[test]
    fn test_decode_aggregate_rows() {
        let rows = vec![
            json!({"_id": "Fiction", "avgPrice": 12.5, "count": 2}),
            json!({"_id": null, "avgPrice": null, "count": 1}),
        ];
        let decoded: Vec<GenreAverage> = decode_rows(rows).unwrap();
        assert_eq!(decoded[0].genre.as_deref(), Some("Fiction"));
        assert_eq!(decoded[0].avg_price, Some(12.5));
        assert_eq!(decoded[1].genre, None);

        let decades: Vec<DecadeCount> =
            decode_rows(vec![json!({"_id": 2010.0, "count": 3})]).unwrap();
        assert_eq!(decades[0].decade, Some(2010));
        assert_eq!(decades[0].count, 3);
    }

    #[test]
    fn test_decode_reports_bad_rows() {
        let result: ReportResult<Vec<AuthorCount>> =
            decode_rows(vec![json!({"_id": "A. Kumar"})]);
        assert!(matches!(result, Err(ReportError::Decode(_))));
    }
}
