//! The capability an object implements to take part in preference binding.
//!
//! Attributes are declared explicitly, either by hand or through the
//! [`bindable!`](crate::bindable) macro, and accessed by name through boxed
//! [`AttributeValue`]s of exactly the declared type.

use std::any::{type_name, TypeId};
use std::sync::{Arc, Mutex};

use thiserror::Error;

use crate::domain::AttributeValue;

/// Per-attribute binding options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Preference {
    /// Explicit dotted path, used verbatim.
    pub key: Option<String>,
    /// Arguments for callables and `{n}` templates.
    pub args: Vec<String>,
    /// Stored as text when the key is absent.
    pub default_value: Option<String>,
    pub format: Option<String>,
    /// Named converter override.
    pub converter: Option<String>,
}

impl Preference {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn default_value(mut self, value: impl Into<String>) -> Self {
        self.default_value = Some(value.into());
        self
    }

    pub fn format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    pub fn converter(mut self, name: impl Into<String>) -> Self {
        self.converter = Some(name.into());
        self
    }
}

/// Declaration of one bindable attribute.
#[derive(Debug, Clone)]
pub struct AttributeSpec {
    pub name: String,
    pub declaring_type: &'static str,
    pub value_type: TypeId,
    pub value_type_name: &'static str,
    pub preference: Preference,
}

impl AttributeSpec {
    pub fn new<T: 'static>(
        name: impl Into<String>,
        declaring_type: &'static str,
        preference: Preference,
    ) -> Self {
        Self {
            name: name.into(),
            declaring_type,
            value_type: TypeId::of::<T>(),
            value_type_name: type_name::<T>(),
            preference,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AccessError {
    #[error("{type_name} has no attribute '{attribute}'")]
    Unknown {
        type_name: String,
        attribute: String,
    },

    #[error("attribute '{attribute}' of {type_name} expects {expected}")]
    TypeMismatch {
        type_name: String,
        attribute: String,
        expected: String,
    },
}

impl AccessError {
    pub fn unknown(type_name: &str, attribute: &str) -> Self {
        Self::Unknown {
            type_name: type_name.to_string(),
            attribute: attribute.to_string(),
        }
    }

    pub fn type_mismatch(type_name: &str, attribute: &str, expected: &str) -> Self {
        Self::TypeMismatch {
            type_name: type_name.to_string(),
            attribute: attribute.to_string(),
            expected: expected.to_string(),
        }
    }
}

pub trait Bindable: Send + 'static {
    /// Runtime type name, used by the instance-type key resolution.
    fn type_name(&self) -> &'static str;

    /// Own attributes first, then inherited ones.
    fn declared_attributes(&self) -> Vec<AttributeSpec>;

    /// `Ok(None)` means the attribute currently holds no value.
    fn read_attribute(&self, name: &str) -> Result<Option<AttributeValue>, AccessError>;

    fn write_attribute(&mut self, name: &str, value: AttributeValue) -> Result<(), AccessError>;

    /// Resets an attribute to "no value". `Ok(false)` when the attribute
    /// always holds a value and was left as is.
    fn clear_attribute(&mut self, _name: &str) -> Result<bool, AccessError> {
        Ok(false)
    }

    /// Opt-in to live re-synchronization.
    fn tracks_changes(&self) -> bool {
        false
    }
}

/// A bound object shared with the instance store.
pub type SharedInstance = Arc<Mutex<dyn Bindable>>;

pub fn shared<B: Bindable>(instance: B) -> SharedInstance {
    Arc::new(Mutex::new(instance))
}

/// Implements [`Bindable`] for a plain struct.
///
/// ```ignore
/// bindable! {
///     Server {
///         tracked: true,
///         base: common,
///         fields {
///             timeout: u64 => Preference::new().key("server.timeout").default_value("30"),
///         }
///         optional {
///             proxy: String => Preference::new(),
///         }
///     }
/// }
/// ```
///
/// `optional` attributes are `Option<T>` fields declared as `T`; `None` reads
/// as "no value" and clearing sets `None`. `base` names an embedded field
/// that is itself `Bindable`; its attributes follow the struct's own.
#[macro_export]
macro_rules! bindable {
    (
        $ty:ty {
            $(tracked: $tracked:expr,)?
            $(base: $base:ident,)?
            fields {
                $($field:ident : $fty:ty => $pref:expr),* $(,)?
            }
            $(optional {
                $($ofield:ident : $oty:ty => $opref:expr),* $(,)?
            })?
        }
    ) => {
        impl $crate::application::binding::Bindable for $ty {
            fn type_name(&self) -> &'static str {
                ::std::any::type_name::<Self>()
            }

            fn declared_attributes(&self) -> ::std::vec::Vec<$crate::application::binding::AttributeSpec> {
                let declaring = ::std::any::type_name::<Self>();
                #[allow(unused_mut)]
                let mut attributes = ::std::vec![
                    $($crate::application::binding::AttributeSpec::new::<$fty>(
                        stringify!($field), declaring, $pref,
                    ),)*
                    $($($crate::application::binding::AttributeSpec::new::<$oty>(
                        stringify!($ofield), declaring, $opref,
                    ),)*)?
                ];
                $(attributes.extend($crate::application::binding::Bindable::declared_attributes(&self.$base));)?
                attributes
            }

            #[allow(unreachable_code)]
            fn read_attribute(
                &self,
                name: &str,
            ) -> ::std::result::Result<
                ::std::option::Option<$crate::domain::AttributeValue>,
                $crate::application::binding::AccessError,
            > {
                $(if name == stringify!($field) {
                    return Ok(Some(
                        ::std::boxed::Box::new(self.$field.clone()) as $crate::domain::AttributeValue,
                    ));
                })*
                $($(if name == stringify!($ofield) {
                    return Ok(self
                        .$ofield
                        .clone()
                        .map(|v| ::std::boxed::Box::new(v) as $crate::domain::AttributeValue));
                })*)?
                $(return $crate::application::binding::Bindable::read_attribute(&self.$base, name);)?
                Err($crate::application::binding::AccessError::unknown(
                    ::std::any::type_name::<Self>(),
                    name,
                ))
            }

            #[allow(unreachable_code)]
            fn write_attribute(
                &mut self,
                name: &str,
                value: $crate::domain::AttributeValue,
            ) -> ::std::result::Result<(), $crate::application::binding::AccessError> {
                $(if name == stringify!($field) {
                    let value = value.downcast::<$fty>().map_err(|_| {
                        $crate::application::binding::AccessError::type_mismatch(
                            ::std::any::type_name::<Self>(),
                            name,
                            ::std::any::type_name::<$fty>(),
                        )
                    })?;
                    self.$field = *value;
                    return Ok(());
                })*
                $($(if name == stringify!($ofield) {
                    let value = value.downcast::<$oty>().map_err(|_| {
                        $crate::application::binding::AccessError::type_mismatch(
                            ::std::any::type_name::<Self>(),
                            name,
                            ::std::any::type_name::<$oty>(),
                        )
                    })?;
                    self.$ofield = Some(*value);
                    return Ok(());
                })*)?
                $(return $crate::application::binding::Bindable::write_attribute(&mut self.$base, name, value);)?
                Err($crate::application::binding::AccessError::unknown(
                    ::std::any::type_name::<Self>(),
                    name,
                ))
            }

            #[allow(unreachable_code)]
            fn clear_attribute(
                &mut self,
                name: &str,
            ) -> ::std::result::Result<bool, $crate::application::binding::AccessError> {
                $(if name == stringify!($field) {
                    return Ok(false);
                })*
                $($(if name == stringify!($ofield) {
                    self.$ofield = None;
                    return Ok(true);
                })*)?
                $(return $crate::application::binding::Bindable::clear_attribute(&mut self.$base, name);)?
                Err($crate::application::binding::AccessError::unknown(
                    ::std::any::type_name::<Self>(),
                    name,
                ))
            }

            fn tracks_changes(&self) -> bool {
                false $(|| $tracked)?
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Common {
        verbose: bool,
    }

    crate::bindable! {
        Common {
            fields {
                verbose: bool => Preference::new(),
            }
        }
    }

    #[derive(Default)]
    struct Server {
        common: Common,
        timeout: u64,
        proxy: Option<String>,
    }

    crate::bindable! {
        Server {
            tracked: true,
            base: common,
            fields {
                timeout: u64 => Preference::new().key("server.timeout").default_value("30"),
            }
            optional {
                proxy: String => Preference::new(),
            }
        }
    }

    #[test]
    fn given_macro_struct_when_listing_attributes_then_own_before_inherited() {
        let server = Server::default();
        let names: Vec<String> = server
            .declared_attributes()
            .into_iter()
            .map(|a| a.name)
            .collect();
        assert_eq!(names, vec!["timeout", "proxy", "verbose"]);
        assert!(server.tracks_changes());
        assert!(!Common::default().tracks_changes());
    }

    #[test]
    fn given_inherited_attribute_when_writing_then_delegates_to_base() {
        let mut server = Server::default();
        server.write_attribute("verbose", Box::new(true)).unwrap();
        assert!(server.common.verbose);
    }

    #[test]
    fn given_wrong_type_when_writing_then_type_mismatch() {
        let mut server = Server::default();
        let err = server
            .write_attribute("timeout", Box::new("x".to_string()))
            .unwrap_err();
        assert!(matches!(err, AccessError::TypeMismatch { .. }));
    }

    #[test]
    fn given_empty_optional_when_reading_then_none() {
        let mut server = Server::default();
        assert!(server.read_attribute("proxy").unwrap().is_none());
        server
            .write_attribute("proxy", Box::new("http://p".to_string()))
            .unwrap();
        assert_eq!(server.proxy.as_deref(), Some("http://p"));
    }

    #[test]
    fn given_attributes_when_clearing_then_only_optional_reset() {
        let mut server = Server {
            timeout: 45,
            proxy: Some("http://p".to_string()),
            ..Server::default()
        };
        server.common.verbose = true;

        assert!(server.clear_attribute("proxy").unwrap());
        assert!(!server.clear_attribute("timeout").unwrap());
        assert!(!server.clear_attribute("verbose").unwrap());

        assert_eq!(server.proxy, None);
        assert_eq!(server.timeout, 45);
        assert!(server.common.verbose);
        assert!(matches!(
            server.clear_attribute("nope"),
            Err(AccessError::Unknown { .. })
        ));
    }

    #[test]
    fn given_unknown_name_when_reading_then_unknown_error() {
        let server = Server::default();
        assert!(matches!(
            server.read_attribute("nope"),
            Err(AccessError::Unknown { .. })
        ));
    }
}
