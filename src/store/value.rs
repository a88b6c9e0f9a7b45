// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Values that can be kept in the parameter store.

use ndarray::{ArrayD, IxDyn};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use strum_macros::IntoStaticStr;

use crate::status::StageStatus;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, IntoStaticStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(#[serde(with = "nullable_f64")] f64),
    Str(String),
    BoolArray(#[serde(with = "bool_array")] ArrayD<bool>),
    FloatArray(#[serde(with = "float_array")] ArrayD<f64>),
    StrArray(Vec<String>),
    Status(StageStatus),
    StatusArray(Vec<StageStatus>),
}

impl ParamValue {
    /// The name of this value's kind, e.g. "float_array".
    pub fn kind(&self) -> &'static str {
        self.into()
    }
}

macro_rules! impl_param_conversions {
    ($t:ty, $variant:ident, $name:literal) => {
        impl From<$t> for ParamValue {
            fn from(v: $t) -> Self {
                ParamValue::$variant(v)
            }
        }

        impl FromParamValue for $t {
            const KIND: &'static str = $name;

            fn from_param_value(v: ParamValue) -> Option<Self> {
                match v {
                    ParamValue::$variant(v) => Some(v),
                    _ => None,
                }
            }
        }
    };
}

/// Types that can be pulled out of a [`ParamValue`] with a kind check.
pub trait FromParamValue: Sized {
    const KIND: &'static str;

    fn from_param_value(v: ParamValue) -> Option<Self>;
}

impl_param_conversions!(bool, Bool, "bool");
impl_param_conversions!(i64, Int, "int");
impl_param_conversions!(f64, Float, "float");
impl_param_conversions!(String, Str, "str");
impl_param_conversions!(ArrayD<bool>, BoolArray, "bool_array");
impl_param_conversions!(ArrayD<f64>, FloatArray, "float_array");
impl_param_conversions!(Vec<String>, StrArray, "str_array");
impl_param_conversions!(StageStatus, Status, "status");
impl_param_conversions!(Vec<StageStatus>, StatusArray, "status_array");

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        ParamValue::Str(v.to_string())
    }
}

/// JSON has no NaN; non-finite values go out as `null` and come back as NaN.
pub mod nullable_f64 {
    use super::*;

    pub fn serialize<S: Serializer>(v: &f64, s: S) -> Result<S::Ok, S::Error> {
        if v.is_finite() {
            s.serialize_some(v)
        } else {
            s.serialize_none()
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
        Ok(Option::<f64>::deserialize(d)?.unwrap_or(f64::NAN))
    }
}

#[derive(Serialize, Deserialize)]
struct RawArray<T> {
    shape: Vec<usize>,
    data: Vec<T>,
}

mod bool_array {
    use super::*;

    pub(super) fn serialize<S: Serializer>(a: &ArrayD<bool>, s: S) -> Result<S::Ok, S::Error> {
        RawArray {
            shape: a.shape().to_vec(),
            data: a.iter().copied().collect(),
        }
        .serialize(s)
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<ArrayD<bool>, D::Error> {
        let RawArray { shape, data } = RawArray::<bool>::deserialize(d)?;
        ArrayD::from_shape_vec(IxDyn(&shape), data).map_err(serde::de::Error::custom)
    }
}

mod float_array {
    use super::*;

    pub(super) fn serialize<S: Serializer>(a: &ArrayD<f64>, s: S) -> Result<S::Ok, S::Error> {
        RawArray {
            shape: a.shape().to_vec(),
            data: a
                .iter()
                .map(|&f| if f.is_finite() { Some(f) } else { None })
                .collect(),
        }
        .serialize(s)
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<ArrayD<f64>, D::Error> {
        let RawArray { shape, data } = RawArray::<Option<f64>>::deserialize(d)?;
        let data = data.into_iter().map(|f| f.unwrap_or(f64::NAN)).collect();
        ArrayD::from_shape_vec(IxDyn(&shape), data).map_err(serde::de::Error::custom)
    }
}
