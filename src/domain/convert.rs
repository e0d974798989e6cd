//! Bidirectional value conversion between preference values and typed attributes.
//!
//! A converter turns a [`PrefValue`] into a boxed attribute value of one
//! declared type, and renders such a value back into text for storage.
//! Converters are produced by factories registered per [`TypeId`] or per name;
//! factories receive the optional format string of a binding.

use std::any::{type_name, Any, TypeId};
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{NaiveDate, NaiveDateTime};
use tracing::debug;

use crate::domain::error::{DomainError, DomainResult};
use crate::domain::value::PrefValue;

/// A typed attribute value in transit between the tree and an object.
pub type AttributeValue = Box<dyn Any + Send>;

/// Name of the marker override meaning "no override".
pub const NOOP_CONVERTER: &str = "noop";

pub const DEFAULT_DATE_FORMAT: &str = "%Y-%m-%d";
pub const DEFAULT_DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

pub trait Converter: Send + Sync {
    /// Converts a stored value into the declared attribute type.
    fn from_value(&self, value: &PrefValue) -> DomainResult<AttributeValue>;

    /// Renders an attribute value as text.
    fn to_text(&self, value: &(dyn Any + Send)) -> DomainResult<String>;

    /// True for the converter that passes raw values through unchanged.
    fn is_noop(&self) -> bool {
        false
    }
}

pub type ConverterFactory =
    Arc<dyn Fn(Option<&str>) -> DomainResult<Box<dyn Converter>> + Send + Sync>;

/// Registry of converter factories keyed by declared type and by name.
#[derive(Default)]
pub struct ConverterRegistry {
    by_type: RwLock<HashMap<TypeId, ConverterFactory>>,
    by_name: RwLock<HashMap<String, ConverterFactory>>,
}

impl fmt::Debug for ConverterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = self
            .by_name
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect::<Vec<_>>();
        f.debug_struct("ConverterRegistry")
            .field(
                "types",
                &self
                    .by_type
                    .read()
                    .unwrap_or_else(PoisonError::into_inner)
                    .len(),
            )
            .field("names", &names)
            .finish()
    }
}

impl ConverterRegistry {
    /// An empty registry. Most callers want [`ConverterRegistry::with_builtins`].
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builtins() -> Self {
        let registry = Self::new();
        registry.register_builtins();
        registry
    }

    pub fn register_type<T: 'static>(&self, factory: ConverterFactory) {
        self.by_type
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(TypeId::of::<T>(), factory);
    }

    pub fn register_named(&self, name: impl Into<String>, factory: ConverterFactory) {
        self.by_name
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.into(), factory);
    }

    /// Finds the converter for a declared type.
    ///
    /// A named override (other than [`NOOP_CONVERTER`]) wins and must exist.
    /// Otherwise the lookup is by type; `Ok(None)` means no converter is known.
    pub fn resolve(
        &self,
        type_id: TypeId,
        target: &str,
        format: Option<&str>,
        converter_override: Option<&str>,
    ) -> DomainResult<Option<Box<dyn Converter>>> {
        if let Some(name) = converter_override.filter(|n| *n != NOOP_CONVERTER) {
            let factory = self
                .by_name
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .get(name)
                .cloned()
                .ok_or_else(|| {
                    DomainError::conversion(target, format!("unknown converter '{name}'"))
                })?;
            debug!("resolve: named converter '{}' for {}", name, target);
            return factory(format).map(Some);
        }
        let factory = self
            .by_type
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&type_id)
            .cloned();
        match factory {
            Some(factory) => factory(format).map(Some),
            None => Ok(None),
        }
    }

    /// Typed shortcut for [`ConverterRegistry::resolve`] without override.
    pub fn resolve_for<T: 'static>(
        &self,
        format: Option<&str>,
    ) -> DomainResult<Option<Box<dyn Converter>>> {
        self.resolve(TypeId::of::<T>(), type_name::<T>(), format, None)
    }

    /// Converts `value` into `T` through the registered converter.
    pub fn convert<T: 'static>(&self, value: &PrefValue, format: Option<&str>) -> DomainResult<T> {
        let converter = self.resolve_for::<T>(format)?.ok_or_else(|| {
            DomainError::conversion(type_name::<T>(), "no converter registered")
        })?;
        let converted = converter.from_value(value)?;
        converted
            .downcast::<T>()
            .map(|b| *b)
            .map_err(|_| DomainError::conversion(type_name::<T>(), "converter produced another type"))
    }

    fn register_builtins(&self) {
        macro_rules! parse_types {
            ($($t:ty),* $(,)?) => {
                $( self.register_type::<$t>(plain(ParseConverter::<$t>::new)); )*
            };
        }
        parse_types!(String, char, i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, f32, f64);

        self.register_type::<bool>(plain(|| BoolConverter));
        self.register_type::<PathBuf>(plain(|| PathConverter));
        self.register_type::<Vec<String>>(plain(|| StringListConverter));
        self.register_type::<PrefValue>(plain(|| NoopConverter));
        self.register_type::<NaiveDate>(date_factory());
        self.register_type::<NaiveDateTime>(datetime_factory());

        self.register_named(NOOP_CONVERTER, plain(|| NoopConverter));
        self.register_named("string", plain(ParseConverter::<String>::new));
        self.register_named("bool", plain(|| BoolConverter));
        self.register_named("path", plain(|| PathConverter));
        self.register_named("list", plain(|| StringListConverter));
        self.register_named("date", date_factory());
        self.register_named("datetime", datetime_factory());
    }
}

fn plain<C: Converter + 'static>(make: fn() -> C) -> ConverterFactory {
    Arc::new(move |_format: Option<&str>| Ok(Box::new(make()) as Box<dyn Converter>))
}

fn date_factory() -> ConverterFactory {
    Arc::new(|format: Option<&str>| {
        Ok(Box::new(DateConverter {
            format: format.unwrap_or(DEFAULT_DATE_FORMAT).to_string(),
        }) as Box<dyn Converter>)
    })
}

fn datetime_factory() -> ConverterFactory {
    Arc::new(|format: Option<&str>| {
        Ok(Box::new(DateTimeConverter {
            format: format.unwrap_or(DEFAULT_DATETIME_FORMAT).to_string(),
        }) as Box<dyn Converter>)
    })
}

fn downcast<'a, T: 'static>(value: &'a (dyn Any + Send)) -> DomainResult<&'a T> {
    value
        .downcast_ref::<T>()
        .ok_or_else(|| DomainError::conversion(type_name::<T>(), "attribute holds another type"))
}

fn scalar_text<'a>(value: &'a PrefValue, target: &str) -> DomainResult<Cow<'a, str>> {
    match value {
        PrefValue::Text(s) => Ok(Cow::Borrowed(s.as_str())),
        PrefValue::Bool(_) | PrefValue::Int(_) | PrefValue::Float(_) => {
            Ok(Cow::Owned(value.to_plain_string()))
        }
        other => Err(DomainError::conversion(
            target,
            format!("expected a scalar, got {other}"),
        )),
    }
}

/// Stringifies the scalar and parses it with [`FromStr`].
pub struct ParseConverter<T>(PhantomData<fn() -> T>);

impl<T> ParseConverter<T> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T> Default for ParseConverter<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Converter for ParseConverter<T>
where
    T: FromStr + fmt::Display + Send + 'static,
    T::Err: fmt::Display,
{
    fn from_value(&self, value: &PrefValue) -> DomainResult<AttributeValue> {
        let target = type_name::<T>();
        let text = scalar_text(value, target)?;
        let parsed = text
            .parse::<T>()
            .map_err(|e| DomainError::conversion(target, format!("'{text}': {e}")))?;
        Ok(Box::new(parsed))
    }

    fn to_text(&self, value: &(dyn Any + Send)) -> DomainResult<String> {
        Ok(downcast::<T>(value)?.to_string())
    }
}

/// Lenient boolean: `true/false`, `yes/no`, `on/off`, `1/0`, case insensitive.
pub struct BoolConverter;

impl Converter for BoolConverter {
    fn from_value(&self, value: &PrefValue) -> DomainResult<AttributeValue> {
        if let PrefValue::Bool(b) = value {
            return Ok(Box::new(*b));
        }
        let text = scalar_text(value, "bool")?;
        let parsed = match text.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "on" | "1" => true,
            "false" | "no" | "off" | "0" => false,
            other => {
                return Err(DomainError::conversion(
                    "bool",
                    format!("'{other}' is not a boolean"),
                ))
            }
        };
        Ok(Box::new(parsed))
    }

    fn to_text(&self, value: &(dyn Any + Send)) -> DomainResult<String> {
        Ok(downcast::<bool>(value)?.to_string())
    }
}

pub struct PathConverter;

impl Converter for PathConverter {
    fn from_value(&self, value: &PrefValue) -> DomainResult<AttributeValue> {
        let text = scalar_text(value, "PathBuf")?;
        Ok(Box::new(PathBuf::from(text.as_ref())))
    }

    fn to_text(&self, value: &(dyn Any + Send)) -> DomainResult<String> {
        Ok(downcast::<PathBuf>(value)?.to_string_lossy().into_owned())
    }
}

/// `Vec<String>` from a list value or from comma-separated text.
pub struct StringListConverter;

impl Converter for StringListConverter {
    fn from_value(&self, value: &PrefValue) -> DomainResult<AttributeValue> {
        let items: Vec<String> = match value {
            PrefValue::List(items) => items.iter().map(PrefValue::to_plain_string).collect(),
            PrefValue::Text(s) if s.trim().is_empty() => Vec::new(),
            PrefValue::Text(s) => s.split(',').map(|p| p.trim().to_string()).collect(),
            other => vec![scalar_text(other, "Vec<String>")?.into_owned()],
        };
        Ok(Box::new(items))
    }

    fn to_text(&self, value: &(dyn Any + Send)) -> DomainResult<String> {
        Ok(downcast::<Vec<String>>(value)?.join(","))
    }
}

pub struct DateConverter {
    format: String,
}

impl Converter for DateConverter {
    fn from_value(&self, value: &PrefValue) -> DomainResult<AttributeValue> {
        let text = scalar_text(value, "NaiveDate")?;
        let date = NaiveDate::parse_from_str(text.trim(), &self.format).map_err(|e| {
            DomainError::conversion("NaiveDate", format!("'{text}' ({}): {e}", self.format))
        })?;
        Ok(Box::new(date))
    }

    fn to_text(&self, value: &(dyn Any + Send)) -> DomainResult<String> {
        Ok(downcast::<NaiveDate>(value)?
            .format(&self.format)
            .to_string())
    }
}

pub struct DateTimeConverter {
    format: String,
}

impl Converter for DateTimeConverter {
    fn from_value(&self, value: &PrefValue) -> DomainResult<AttributeValue> {
        let text = scalar_text(value, "NaiveDateTime")?;
        let ts = NaiveDateTime::parse_from_str(text.trim(), &self.format).map_err(|e| {
            DomainError::conversion("NaiveDateTime", format!("'{text}' ({}): {e}", self.format))
        })?;
        Ok(Box::new(ts))
    }

    fn to_text(&self, value: &(dyn Any + Send)) -> DomainResult<String> {
        Ok(downcast::<NaiveDateTime>(value)?
            .format(&self.format)
            .to_string())
    }
}

/// Passes the raw value through in its native form.
pub struct NoopConverter;

impl Converter for NoopConverter {
    fn from_value(&self, value: &PrefValue) -> DomainResult<AttributeValue> {
        match value {
            PrefValue::Callable(_) => Err(DomainError::conversion(
                "native value",
                "callables have no native form",
            )),
            other => Ok(Box::new(other.clone())),
        }
    }

    fn to_text(&self, value: &(dyn Any + Send)) -> DomainResult<String> {
        PrefValue::from_native(value)
            .map(|v| v.to_plain_string())
            .ok_or_else(|| DomainError::conversion("text", "unsupported native type"))
    }

    fn is_noop(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn given_text_number_when_converting_to_u32_then_parses() {
        let registry = ConverterRegistry::with_builtins();
        let port: u32 = registry.convert(&PrefValue::text("8080"), None).unwrap();
        assert_eq!(port, 8080);
    }

    #[test]
    fn given_int_when_converting_to_string_then_renders_plain() {
        let registry = ConverterRegistry::with_builtins();
        let s: String = registry.convert(&PrefValue::Int(30), None).unwrap();
        assert_eq!(s, "30");
    }

    #[test]
    fn given_garbage_when_converting_to_int_then_conversion_error() {
        let registry = ConverterRegistry::with_builtins();
        let err = registry.convert::<i64>(&PrefValue::text("abc"), None).unwrap_err();
        assert!(matches!(err, DomainError::Conversion { .. }));
    }

    #[test]
    fn given_yes_when_converting_to_bool_then_true() {
        let registry = ConverterRegistry::with_builtins();
        assert!(registry.convert::<bool>(&PrefValue::text("Yes"), None).unwrap());
        assert!(!registry.convert::<bool>(&PrefValue::Int(0), None).unwrap());
    }

    #[test]
    fn given_format_when_converting_date_then_uses_it() {
        let registry = ConverterRegistry::with_builtins();
        let date: NaiveDate = registry
            .convert(&PrefValue::text("16.10.2026"), Some("%d.%m.%Y"))
            .unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(2026, 10, 16).unwrap());

        let converter = registry.resolve_for::<NaiveDate>(Some("%d.%m.%Y")).unwrap().unwrap();
        assert_eq!(converter.to_text(&date).unwrap(), "16.10.2026");
    }

    #[test]
    fn given_comma_text_when_converting_to_list_then_splits_and_trims() {
        let registry = ConverterRegistry::with_builtins();
        let items: Vec<String> = registry.convert(&PrefValue::text("a, b,c"), None).unwrap();
        assert_eq!(items, vec!["a", "b", "c"]);
    }

    #[test]
    fn given_unknown_override_when_resolving_then_conversion_error() {
        let registry = ConverterRegistry::with_builtins();
        let result = registry.resolve(TypeId::of::<i64>(), "i64", None, Some("bogus"));
        assert!(matches!(result, Err(DomainError::Conversion { .. })));
    }

    #[test]
    fn given_noop_override_when_resolving_then_falls_back_to_type() {
        let registry = ConverterRegistry::with_builtins();
        let converter = registry
            .resolve(TypeId::of::<i64>(), "i64", None, Some(NOOP_CONVERTER))
            .unwrap()
            .unwrap();
        assert!(!converter.is_noop());
    }

    #[test]
    fn given_unregistered_type_when_resolving_then_none() {
        struct Opaque;
        let registry = ConverterRegistry::with_builtins();
        assert!(registry.resolve_for::<Opaque>(None).unwrap().is_none());
    }
}
