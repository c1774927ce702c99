//! The declarative schema for distributed objects.

/// Declares a distributed object type.
///
/// ```ignore
/// distributed_object! {
///     pub struct User as "User" {
///         gamertag as "gamertag": String => set_gamertag,
///         best_friend as "bestFriend": Option<ObjectRef> => set_best_friend,
///     }
///     methods {
///         "setGamertag" => change_gamertag,
///     }
/// }
/// ```
///
/// Generates:
/// 1. The struct, holding the record id, the observer list and one lock per
///    property. Every property type must implement `PropertyValue + Default`.
/// 2. `new(id)` for a bare instance and `create(&session, id)` which
///    registers it and returns the canonical instance.
/// 3. A getter named after each field and the named setter, which stores the
///    value and notifies observers with the wire key.
/// 4. `Schema` and `DistributedObject` impls. Wire method names dispatch to
///    inherent methods of the form
///    `fn(&self, &Runtime, Vec<Arg>) -> MethodResult`.
#[macro_export]
macro_rules! distributed_object {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident as $wire_name:literal {
            $( $field:ident as $key:literal : $ty:ty => $setter:ident ),* $(,)?
        }
        $( methods { $( $method:literal => $handler:ident ),* $(,)? } )?
    ) => {
        $(#[$meta])*
        $vis struct $name {
            record_id: $crate::zonewire::RecordId,
            observers: $crate::property::Observers,
            $( $field: ::std::sync::RwLock<$ty>, )*
        }

        impl $name {
            pub fn new(record_id: impl Into<$crate::zonewire::RecordId>) -> Self {
                Self {
                    record_id: record_id.into(),
                    observers: $crate::property::Observers::new(),
                    $( $field: ::std::sync::RwLock::new(<$ty as ::std::default::Default>::default()), )*
                }
            }

            /// Builds a bare instance and registers it with `session`. If an
            /// instance with this id already exists, that one is returned.
            pub fn create(
                session: &$crate::object::Session,
                record_id: impl Into<$crate::zonewire::RecordId>,
            ) -> $crate::object::Result<::std::sync::Arc<Self>> {
                session.register(Self::new(record_id))
            }

            $(
                pub fn $field(&self) -> $ty {
                    self.$field
                        .read()
                        .unwrap_or_else(::std::sync::PoisonError::into_inner)
                        .clone()
                }

                pub fn $setter(&self, value: $ty) {
                    let wire = $crate::property::PropertyValue::to_wire(&value);
                    *self.$field
                        .write()
                        .unwrap_or_else(::std::sync::PoisonError::into_inner) = value;
                    self.observers.notify(&$crate::property::PropertyChange {
                        object: $crate::object::DistributedObject::object_ref(self),
                        property: $key,
                        value: wire,
                    });
                }
            )*
        }

        impl $crate::object::Schema for $name {
            const TYPE_NAME: &'static str = $wire_name;
            const PROPERTIES: &'static [&'static str] = &[$($key),*];

            fn bare(record_id: $crate::zonewire::RecordId) -> Self {
                Self::new(record_id)
            }
        }

        impl $crate::object::DistributedObject for $name {
            fn type_name(&self) -> &str {
                $wire_name
            }

            fn record_id(&self) -> $crate::zonewire::RecordId {
                self.record_id.clone()
            }

            fn property_names(&self) -> &'static [&'static str] {
                <Self as $crate::object::Schema>::PROPERTIES
            }

            fn property(&self, name: &str) -> ::std::option::Option<$crate::serde_json::Value> {
                match name {
                    $( $key => ::std::option::Option::Some($crate::property::PropertyValue::to_wire(
                        &*self.$field
                            .read()
                            .unwrap_or_else(::std::sync::PoisonError::into_inner),
                    )), )*
                    _ => ::std::option::Option::None,
                }
            }

            #[allow(unused_variables)]
            fn apply(&self, name: &str, value: $crate::serde_json::Value) -> $crate::object::Result<()> {
                match name {
                    $( $key => {
                        let typed = <$ty as $crate::property::PropertyValue>::from_wire(value)
                            .ok_or_else(|| $crate::object::Error::TypeMismatch {
                                type_name: $wire_name.to_string(),
                                property: name.to_string(),
                            })?;
                        self.$setter(typed);
                        Ok(())
                    } )*
                    _ => Err($crate::object::Error::UnknownProperty {
                        type_name: $wire_name.to_string(),
                        property: name.to_string(),
                    }),
                }
            }

            fn observers(&self) -> &$crate::property::Observers {
                &self.observers
            }

            #[allow(unused_variables)]
            fn invoke(
                &self,
                rt: &$crate::runtime::Runtime,
                method: &str,
                args: ::std::vec::Vec<$crate::arg::Arg>,
            ) -> ::std::option::Option<$crate::rpc::MethodResult> {
                match method {
                    $($( $method => ::std::option::Option::Some(self.$handler(rt, args)), )*)?
                    _ => ::std::option::Option::None,
                }
            }

            fn as_any(
                self: ::std::sync::Arc<Self>,
            ) -> ::std::sync::Arc<dyn ::std::any::Any + Send + Sync> {
                self
            }
        }
    };
}
