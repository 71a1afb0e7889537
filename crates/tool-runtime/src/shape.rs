use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Geometry for one shape, as written by the model.
///
/// Every field is optional and nothing is defaulted: a missing field stays
/// `None` and the consuming handler decides what that means. The element the
/// record was read from is kept in `raw` so handlers can inspect anything the
/// known fields did not capture.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShapeParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub radius: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub radius_x: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub radius_y: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x1: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y1: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x2: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y2: Option<f64>,
    #[serde(skip)]
    pub raw: Value,
}

impl ShapeParams {
    /// Read a record from one parsed element.
    ///
    /// Non-object elements and unknown keys pass through in `raw` untouched.
    /// Line endpoints nested under `points` are lifted when the top-level
    /// fields are absent.
    pub fn from_value(value: Value) -> Self {
        let Some(obj) = value.as_object() else {
            return Self {
                raw: value,
                ..Self::default()
            };
        };

        let num = |key: &str| obj.get(key).and_then(Value::as_f64);
        let point = |key: &str| {
            num(key).or_else(|| obj.get("points").and_then(|p| p.get(key)).and_then(Value::as_f64))
        };

        Self {
            x: num("x"),
            y: num("y"),
            radius: num("radius"),
            radius_x: num("radiusX"),
            radius_y: num("radiusY"),
            width: num("width"),
            height: num("height"),
            x1: point("x1"),
            y1: point("y1"),
            x2: point("x2"),
            y2: point("y2"),
            raw: value,
        }
    }

    /// True when none of the known geometry fields is set.
    pub fn is_empty(&self) -> bool {
        [
            self.x,
            self.y,
            self.radius,
            self.radius_x,
            self.radius_y,
            self.width,
            self.height,
            self.x1,
            self.y1,
            self.x2,
            self.y2,
        ]
        .iter()
        .all(Option::is_none)
    }
}
