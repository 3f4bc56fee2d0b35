//! Result records served to callers and stored in the cache as JSON.

use serde::{Deserialize, Serialize};

/// A row of the `users` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: i64,
    pub name: String,
    /// `age` is a nullable column.
    pub age: Option<i64>,
}

/// Class label produced by the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prediction {
    pub prediction: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_user_record_json_shape() {
        let rec = UserRecord {
            id: 1,
            name: "Michael".into(),
            age: Some(45),
        };
        assert_eq!(
            serde_json::to_value(&rec).unwrap(),
            json!({"id": 1, "name": "Michael", "age": 45})
        );
        let back: UserRecord = serde_json::from_slice(&serde_json::to_vec(&rec).unwrap()).unwrap();
        assert_eq!(back, rec);
    }

    #[test]
    fn test_null_age_roundtrips() {
        let rec = UserRecord {
            id: 7,
            name: "Toby".into(),
            age: None,
        };
        let text = serde_json::to_string(&rec).unwrap();
        assert_eq!(text, r#"{"id":7,"name":"Toby","age":null}"#);
        assert_eq!(serde_json::from_str::<UserRecord>(&text).unwrap(), rec);
    }

    #[test]
    fn test_prediction_json_shape() {
        let p = Prediction { prediction: 2 };
        assert_eq!(serde_json::to_string(&p).unwrap(), r#"{"prediction":2}"#);
    }
}
