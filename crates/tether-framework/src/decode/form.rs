//! A serde deserializer over multi-valued form data.
//!
//! Decoding is lenient in the way HTML forms need:
//!
//! - unknown keys are ignored;
//! - a field with no key becomes its zero value (`""`, `0`, `false`, `None`, empty `Vec`);
//! - keys match field names exactly first, then ignoring ASCII case;
//! - a scalar field takes the last value of its key, untrimmed;
//! - a value that does not convert is reported and decoding continues, so a
//!   single error lists every bad field.

use std::cell::RefCell;
use std::collections::HashMap;
use std::collections::hash_map;
use std::str::FromStr;

use serde::de::value::{StrDeserializer, StringDeserializer};
use serde::de::{
    DeserializeOwned, DeserializeSeed, Deserializer, IntoDeserializer, MapAccess, SeqAccess,
    Visitor,
};
use serde::forward_to_deserialize_any;

use crate::error::FormError;

/// Declares which keys a form-decoded type cannot do without.
///
/// Derive it with `#[derive(FormSchema)]` and mark fields `#[form(required)]`,
/// or implement it by hand:
///
/// ```rust,ignore
/// impl FormSchema for Rename {
///     const REQUIRED: &'static [&'static str] = &["newname"];
/// }
/// ```
pub trait FormSchema {
    /// Keys that must be present with a non-empty first value.
    const REQUIRED: &'static [&'static str] = &[];
}

/// Multi-valued form data keyed by field name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormValues {
    entries: HashMap<String, Vec<String>>,
}

impl FormValues {
    /// Creates an empty set of values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses `application/x-www-form-urlencoded` text such as a query string.
    ///
    /// A `%` not followed by two hex digits is an error rather than a literal.
    pub fn parse_urlencoded(input: &[u8]) -> Result<Self, FormError> {
        check_escapes(input)?;
        Ok(Self::from_pairs(
            url::form_urlencoded::parse(input).into_owned(),
        ))
    }

    /// Collects `(key, value)` pairs, keeping repeated keys.
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let mut values = Self::new();
        for (k, v) in pairs {
            values.append(k, v);
        }
        values
    }

    /// Adds a value for `key`.
    pub fn append(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries
            .entry(key.into())
            .or_default()
            .push(value.into());
    }

    /// Replaces all values of `key` with `value`.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), vec![value.into()]);
    }

    /// All values of `key`, matching exactly and then ignoring ASCII case.
    pub fn get(&self, key: &str) -> Option<&[String]> {
        self.entries
            .get(key)
            .or_else(|| {
                self.entries
                    .iter()
                    .find(|(k, _)| k.eq_ignore_ascii_case(key))
                    .map(|(_, v)| v)
            })
            .map(Vec::as_slice)
    }

    /// The first value of `key`.
    pub fn first(&self, key: &str) -> Option<&str> {
        self.get(key)
            .and_then(|v| v.first())
            .map(String::as_str)
    }

    /// Number of distinct keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether there are no keys.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn check_escapes(input: &[u8]) -> Result<(), FormError> {
    let mut rest = input;
    while let Some(at) = rest.iter().position(|&b| b == b'%') {
        let escape = &rest[at..];
        let valid = escape.len() >= 3
            && escape[1].is_ascii_hexdigit()
            && escape[2].is_ascii_hexdigit();
        if !valid {
            let shown = &escape[..escape.len().min(3)];
            return Err(FormError::InvalidEscape(
                String::from_utf8_lossy(shown).into_owned(),
            ));
        }
        rest = &escape[3..];
    }
    Ok(())
}

/// Decodes `values` into `T`, checking [`FormSchema::REQUIRED`] first.
pub fn decode<T>(values: &FormValues) -> Result<T, FormError>
where
    T: DeserializeOwned + FormSchema,
{
    let missing: Vec<_> = T::REQUIRED
        .iter()
        .filter(|key| values.first(key).is_none_or(str::is_empty))
        .map(|key| FormError::empty_field(*key))
        .collect();
    if let Some(err) = FormError::collect(missing) {
        return Err(err);
    }

    let errors = RefCell::new(Vec::new());
    let decoded = T::deserialize(FormDeserializer {
        values,
        errors: &errors,
    });
    let mut errors = errors.into_inner();
    match decoded {
        Ok(value) if errors.is_empty() => Ok(value),
        Ok(_) => Err(FormError::collect(errors).unwrap_or(FormError::Multi(Vec::new()))),
        Err(err) => {
            errors.push(err);
            Err(FormError::collect(errors).unwrap_or(FormError::Multi(Vec::new())))
        }
    }
}

struct FormDeserializer<'a> {
    values: &'a FormValues,
    errors: &'a RefCell<Vec<FormError>>,
}

impl<'de> Deserializer<'de> for FormDeserializer<'_> {
    type Error = FormError;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, FormError> {
        self.deserialize_map(visitor)
    }

    fn deserialize_map<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, FormError> {
        visitor.visit_map(EntryAccess {
            entries: self.values.entries.iter(),
            pending: None,
            errors: self.errors,
        })
    }

    fn deserialize_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, FormError> {
        visitor.visit_map(FieldAccess {
            fields: fields.iter(),
            current: "",
            values: self.values,
            errors: self.errors,
        })
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value, FormError> {
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_unit<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, FormError> {
        visitor.visit_unit()
    }

    forward_to_deserialize_any! {
        bool i8 i16 i32 i64 i128 u8 u16 u32 u64 u128 f32 f64 char str string
        bytes byte_buf option unit_struct seq tuple tuple_struct enum
        identifier ignored_any
    }
}

/// Walks the declared fields of a struct, present or not.
struct FieldAccess<'a> {
    fields: std::slice::Iter<'static, &'static str>,
    current: &'static str,
    values: &'a FormValues,
    errors: &'a RefCell<Vec<FormError>>,
}

impl<'de> MapAccess<'de> for FieldAccess<'_> {
    type Error = FormError;

    fn next_key_seed<K: DeserializeSeed<'de>>(
        &mut self,
        seed: K,
    ) -> Result<Option<K::Value>, FormError> {
        let Some(field) = self.fields.next() else {
            return Ok(None);
        };
        self.current = field;
        let key: StrDeserializer<'_, FormError> = field.into_deserializer();
        seed.deserialize(key).map(Some)
    }

    fn next_value_seed<V: DeserializeSeed<'de>>(&mut self, seed: V) -> Result<V::Value, FormError> {
        seed.deserialize(ValueDeserializer {
            key: self.current,
            values: self.values.get(self.current),
            errors: self.errors,
        })
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.fields.len())
    }
}

/// Walks every key present, for map targets.
struct EntryAccess<'a> {
    entries: hash_map::Iter<'a, String, Vec<String>>,
    pending: Option<(&'a str, &'a [String])>,
    errors: &'a RefCell<Vec<FormError>>,
}

impl<'de> MapAccess<'de> for EntryAccess<'_> {
    type Error = FormError;

    fn next_key_seed<K: DeserializeSeed<'de>>(
        &mut self,
        seed: K,
    ) -> Result<Option<K::Value>, FormError> {
        let Some((key, values)) = self.entries.next() else {
            return Ok(None);
        };
        self.pending = Some((key.as_str(), values.as_slice()));
        let key: StrDeserializer<'_, FormError> = key.as_str().into_deserializer();
        seed.deserialize(key).map(Some)
    }

    fn next_value_seed<V: DeserializeSeed<'de>>(&mut self, seed: V) -> Result<V::Value, FormError> {
        let (key, values) = self
            .pending
            .take()
            .ok_or_else(|| FormError::Custom("value requested before key".to_string()))?;
        seed.deserialize(ValueDeserializer {
            key,
            values: Some(values),
            errors: self.errors,
        })
    }
}

/// Deserializes the values of one key.
struct ValueDeserializer<'a> {
    key: &'a str,
    values: Option<&'a [String]>,
    errors: &'a RefCell<Vec<FormError>>,
}

impl<'a> ValueDeserializer<'a> {
    fn raw(&self) -> Option<&'a str> {
        self.values
            .and_then(|v| v.last())
            .map(String::as_str)
    }

    /// Parses the last value, recording a conversion error and yielding the
    /// zero value when it does not fit.
    fn convert<T: FromStr + Default>(&self) -> T {
        self.convert_with(|raw| raw.parse().ok())
    }

    fn convert_with<T: Default>(&self, parse: impl FnOnce(&str) -> Option<T>) -> T {
        match self.raw() {
            None | Some("") => T::default(),
            Some(raw) => parse(raw).unwrap_or_else(|| {
                self.errors
                    .borrow_mut()
                    .push(FormError::conversion(self.key));
                T::default()
            }),
        }
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw {
        "1" | "t" | "T" | "true" | "TRUE" | "True" | "on" => Some(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" | "off" => Some(false),
        _ => None,
    }
}

macro_rules! deserialize_parsed {
    ($($method:ident => $visit:ident($ty:ty),)*) => {
        $(
            fn $method<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, FormError> {
                visitor.$visit(self.convert::<$ty>())
            }
        )*
    };
}

impl<'de> Deserializer<'de> for ValueDeserializer<'_> {
    type Error = FormError;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, FormError> {
        match self.values {
            None => visitor.visit_none(),
            Some([single]) => visitor.visit_string(single.clone()),
            Some(_) => self.deserialize_seq(visitor),
        }
    }

    fn deserialize_bool<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, FormError> {
        visitor.visit_bool(self.convert_with(parse_bool))
    }

    deserialize_parsed! {
        deserialize_i8 => visit_i8(i8),
        deserialize_i16 => visit_i16(i16),
        deserialize_i32 => visit_i32(i32),
        deserialize_i64 => visit_i64(i64),
        deserialize_i128 => visit_i128(i128),
        deserialize_u8 => visit_u8(u8),
        deserialize_u16 => visit_u16(u16),
        deserialize_u32 => visit_u32(u32),
        deserialize_u64 => visit_u64(u64),
        deserialize_u128 => visit_u128(u128),
        deserialize_f32 => visit_f32(f32),
        deserialize_f64 => visit_f64(f64),
        deserialize_char => visit_char(char),
    }

    fn deserialize_str<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, FormError> {
        visitor.visit_string(self.raw().unwrap_or_default().to_owned())
    }

    fn deserialize_string<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, FormError> {
        self.deserialize_str(visitor)
    }

    fn deserialize_bytes<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, FormError> {
        visitor.visit_byte_buf(self.raw().unwrap_or_default().as_bytes().to_vec())
    }

    fn deserialize_byte_buf<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, FormError> {
        self.deserialize_bytes(visitor)
    }

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, FormError> {
        if self.values.is_none() {
            visitor.visit_none()
        } else {
            visitor.visit_some(self)
        }
    }

    fn deserialize_unit<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, FormError> {
        visitor.visit_unit()
    }

    fn deserialize_unit_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value, FormError> {
        visitor.visit_unit()
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value, FormError> {
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_seq<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, FormError> {
        visitor.visit_seq(ValuesAccess {
            key: self.key,
            values: self.values.unwrap_or_default().iter(),
            errors: self.errors,
        })
    }

    fn deserialize_tuple<V: Visitor<'de>>(
        self,
        _len: usize,
        visitor: V,
    ) -> Result<V::Value, FormError> {
        self.deserialize_seq(visitor)
    }

    fn deserialize_tuple_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _len: usize,
        visitor: V,
    ) -> Result<V::Value, FormError> {
        self.deserialize_seq(visitor)
    }

    fn deserialize_map<V: Visitor<'de>>(self, _visitor: V) -> Result<V::Value, FormError> {
        Err(FormError::Custom(format!(
            "nested value for \"{}\" is not supported",
            self.key
        )))
    }

    fn deserialize_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, FormError> {
        self.deserialize_map(visitor)
    }

    fn deserialize_enum<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, FormError> {
        let variant: StringDeserializer<FormError> =
            self.raw().unwrap_or_default().to_owned().into_deserializer();
        visitor.visit_enum(variant)
    }

    fn deserialize_identifier<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, FormError> {
        self.deserialize_str(visitor)
    }

    fn deserialize_ignored_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, FormError> {
        visitor.visit_unit()
    }
}

struct ValuesAccess<'a> {
    key: &'a str,
    values: std::slice::Iter<'a, String>,
    errors: &'a RefCell<Vec<FormError>>,
}

impl<'de> SeqAccess<'de> for ValuesAccess<'_> {
    type Error = FormError;

    fn next_element_seed<T: DeserializeSeed<'de>>(
        &mut self,
        seed: T,
    ) -> Result<Option<T::Value>, FormError> {
        let Some(value) = self.values.next() else {
            return Ok(None);
        };
        seed.deserialize(ValueDeserializer {
            key: self.key,
            values: Some(std::slice::from_ref(value)),
            errors: self.errors,
        })
        .map(Some)
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.values.len())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use serde::Deserialize;

    use super::*;

    #[derive(Debug, Default, Deserialize, PartialEq)]
    struct Article {
        category: String,
        id: i64,
        draft: bool,
        tags: Vec<String>,
        score: Option<f64>,
    }

    impl FormSchema for Article {}

    #[derive(Debug, Deserialize)]
    struct Rename {
        newname: String,
    }

    impl FormSchema for Rename {
        const REQUIRED: &'static [&'static str] = &["newname"];
    }

    #[derive(Debug, Deserialize, PartialEq)]
    #[serde(rename_all = "lowercase")]
    enum Sort {
        Newest,
        Oldest,
    }

    #[derive(Debug, Deserialize)]
    struct Listing {
        sort: Sort,
    }

    impl FormSchema for Listing {}

    #[test]
    fn test_decodes_values_and_zero_fills() {
        let values = FormValues::from_pairs([
            ("category", "test"),
            ("id", "7"),
            ("tags", "a"),
            ("tags", "b"),
            ("unknown", "ignored"),
        ]);
        let article: Article = decode(&values).unwrap();
        assert_eq!(
            article,
            Article {
                category: "test".into(),
                id: 7,
                draft: false,
                tags: vec!["a".into(), "b".into()],
                score: None,
            }
        );
    }

    #[test]
    fn test_keys_match_case_insensitively() {
        let values = FormValues::from_pairs([("Category", "news"), ("ID", "3"), ("Draft", "on")]);
        let article: Article = decode(&values).unwrap();
        assert_eq!(article.category, "news");
        assert_eq!(article.id, 3);
        assert!(article.draft);
    }

    #[test]
    fn test_conversion_errors_are_collected() {
        let values = FormValues::from_pairs([("id", "not-a-number")]);
        let err = decode::<Article>(&values).unwrap_err();
        assert_eq!(err.to_string(), "schema: error converting value for \"id\"");

        let values = FormValues::from_pairs([("id", "x"), ("score", "y")]);
        let err = decode::<Article>(&values).unwrap_err();
        assert!(matches!(&err, FormError::Multi(errors) if errors.len() == 2));
    }

    #[test]
    fn test_scalar_takes_last_value_untrimmed() {
        let values = FormValues::from_pairs([("id", "1"), ("id", "2"), ("category", "a")]);
        let article: Article = decode(&values).unwrap();
        assert_eq!(article.id, 2);

        let values = FormValues::from_pairs([("category", "a"), ("category", "b")]);
        let article: Article = decode(&values).unwrap();
        assert_eq!(article.category, "b");

        let err = decode::<Article>(&FormValues::from_pairs([("id", " 7")])).unwrap_err();
        assert_eq!(err.to_string(), "schema: error converting value for \"id\"");
    }

    #[test]
    fn test_required_checks_first_value() {
        let values = FormValues::from_pairs([("newname", ""), ("newname", "dude")]);
        assert_eq!(
            decode::<Rename>(&values).unwrap_err(),
            FormError::empty_field("newname")
        );

        let values = FormValues::from_pairs([("newname", "dude"), ("newname", "")]);
        let ok: Rename = decode(&values).unwrap();
        assert_eq!(ok.newname, "");
    }

    #[test]
    fn test_required_field_must_be_non_empty() {
        let err = decode::<Rename>(&FormValues::from_pairs([("newname", "")])).unwrap_err();
        assert_eq!(err.to_string(), "newname is empty");

        let err = decode::<Rename>(&FormValues::new()).unwrap_err();
        assert_eq!(err, FormError::empty_field("newname"));

        let ok: Rename = decode(&FormValues::from_pairs([("newname", "dude")])).unwrap();
        assert_eq!(ok.newname, "dude");
    }

    #[test]
    fn test_unit_enum_values() {
        let listing: Listing = decode(&FormValues::from_pairs([("sort", "oldest")])).unwrap();
        assert_eq!(listing.sort, Sort::Oldest);
        assert!(decode::<Listing>(&FormValues::from_pairs([("sort", "random")])).is_err());
    }

    #[test]
    fn test_parse_urlencoded_rejects_bad_escapes() {
        let values = FormValues::parse_urlencoded(b"a=%41b&c=x+y&a=2").unwrap();
        assert_eq!(values.get("a"), Some(&["Ab".to_owned(), "2".to_owned()][..]));
        assert_eq!(values.first("c"), Some("x y"));

        let err = FormValues::parse_urlencoded(b"id=%zz").unwrap_err();
        assert_eq!(err.to_string(), "invalid URL escape \"%zz\"");

        let err = FormValues::parse_urlencoded(b"id=7%4").unwrap_err();
        assert_eq!(err, FormError::InvalidEscape("%4".into()));
    }

    #[test]
    fn test_map_target_reads_values() {
        impl FormSchema for HashMap<String, String> {}

        let map: HashMap<String, String> =
            decode(&FormValues::from_pairs([("a", "1"), ("b", "2")])).unwrap();
        assert_eq!(map.get("a").map(String::as_str), Some("1"));
        assert_eq!(map.get("b").map(String::as_str), Some("2"));
    }
}
