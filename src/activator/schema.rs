//! Declarative record schemas
//!
//! A record type lists its parameters once, in [`Record::schema`]: which map
//! key feeds which parameter, which parameters are always created, which
//! receive the lookup's [`Network`] and which receive an injected value.
//! Each declaration hands back a typed [`Slot`] that the constructor closure
//! later redeems through [`Args::take`].
//!
//! The declaration is compiled once per type into a [`RecordActivator`]
//! (name table keyed by [`Key`], per-parameter default constructors) and
//! cached in the [`ActivatorRegistry`](super::ActivatorRegistry).
//!
//! ```
//! use geolocations::activator::{Record, Schema};
//! use std::collections::BTreeMap;
//!
//! struct Place {
//!     geoname_id: Option<u32>,
//!     names: BTreeMap<String, String>,
//! }
//!
//! impl Record for Place {
//!     fn schema(schema: &mut Schema<Self>) {
//!         let geoname_id = schema.field("geoname_id");
//!         let names = schema.field("names");
//!         schema.constructor(move |args| {
//!             Ok(Place {
//!                 geoname_id: args.take(geoname_id)?,
//!                 names: args.take(names)?,
//!             })
//!         });
//!     }
//! }
//! ```

use crate::decoder::{Decode, DecodeContext, Decoder};
use crate::error::{Error, Result};
use crate::key::Key;
use crate::mmdb::types::TypeTag;
use crate::network::Network;
use rustc_hash::FxHashMap;
use std::any::{type_name, Any};
use std::fmt;
use std::marker::PhantomData;

type Boxed = Box<dyn Any + Send>;
type DecodeFn = fn(&Decoder<'_>, usize, &DecodeContext<'_>) -> Result<(Boxed, usize)>;
type DefaultFn = fn(&DecodeContext<'_>) -> Result<Boxed>;
type InjectFn = fn(&(dyn Any + Send + Sync)) -> Option<Boxed>;
type Constructor<T> = Box<dyn Fn(&mut Args) -> Result<T> + Send + Sync>;

/// A type built from a decoded map through a declared schema
pub trait Record: Sized + Send + 'static {
    /// Declare the parameters and exactly one constructor
    fn schema(schema: &mut Schema<Self>);
}

/// Typed handle to one declared parameter
pub struct Slot<P> {
    index: usize,
    _marker: PhantomData<fn() -> P>,
}

impl<P> Clone for Slot<P> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<P> Copy for Slot<P> {}

impl<P> fmt::Debug for Slot<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Slot({}: {})", self.index, type_name::<P>())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlotKind {
    Field {
        name: &'static str,
        always_create: bool,
    },
    Network,
    Inject {
        name: &'static str,
    },
}

struct SlotSpec {
    kind: SlotKind,
    type_name: &'static str,
    decode: Option<DecodeFn>,
    empty: DefaultFn,
    create: DefaultFn,
    inject: Option<InjectFn>,
}

fn decode_boxed<P: Decode>(d: &Decoder<'_>, offset: usize, ctx: &DecodeContext<'_>) -> Result<(Boxed, usize)> {
    P::decode(d, offset, ctx).map(|(value, used)| (Box::new(value) as Boxed, used))
}

fn empty_boxed<P: Decode>(ctx: &DecodeContext<'_>) -> Result<Boxed> {
    P::empty(ctx).map(|value| Box::new(value) as Boxed)
}

fn create_boxed<P: Decode>(ctx: &DecodeContext<'_>) -> Result<Boxed> {
    P::create(ctx).map(|value| Box::new(value) as Boxed)
}

fn no_network(_ctx: &DecodeContext<'_>) -> Result<Boxed> {
    Ok(Box::new(None::<Network>))
}

fn inject_boxed<P: Clone + Send + 'static>(value: &(dyn Any + Send + Sync)) -> Option<Boxed> {
    value
        .downcast_ref::<P>()
        .map(|v| Box::new(v.clone()) as Boxed)
}

/// Parameter declarations of one record type
pub struct Schema<T> {
    slots: Vec<SlotSpec>,
    constructors: Vec<Constructor<T>>,
}

impl<T: Record> Schema<T> {
    fn new() -> Self {
        Self {
            slots: Vec::new(),
            constructors: Vec::new(),
        }
    }

    fn push<P>(&mut self, spec: SlotSpec) -> Slot<P> {
        self.slots.push(spec);
        Slot {
            index: self.slots.len() - 1,
            _marker: PhantomData,
        }
    }

    /// Parameter fed by the map key `name`; absent keys give `P`'s empty value
    pub fn field<P: Decode>(&mut self, name: &'static str) -> Slot<P> {
        self.push(SlotSpec {
            kind: SlotKind::Field {
                name,
                always_create: false,
            },
            type_name: type_name::<P>(),
            decode: Some(decode_boxed::<P>),
            empty: empty_boxed::<P>,
            create: create_boxed::<P>,
            inject: None,
        })
    }

    /// Parameter fed by the map key `name`; when the key is absent a fresh
    /// instance is created (`Some(default)` for an `Option`)
    pub fn always_create<P: Decode>(&mut self, name: &'static str) -> Slot<P> {
        self.push(SlotSpec {
            kind: SlotKind::Field {
                name,
                always_create: true,
            },
            type_name: type_name::<P>(),
            decode: Some(decode_boxed::<P>),
            empty: empty_boxed::<P>,
            create: create_boxed::<P>,
            inject: None,
        })
    }

    /// Parameter receiving the network of the current lookup
    /// (`None` during full iteration)
    pub fn network(&mut self) -> Slot<Option<Network>> {
        self.push(SlotSpec {
            kind: SlotKind::Network,
            type_name: type_name::<Option<Network>>(),
            decode: None,
            empty: no_network,
            create: no_network,
            inject: None,
        })
    }

    /// Parameter receiving the caller-supplied value stored under `name`
    pub fn inject<P: Decode + Clone>(&mut self, name: &'static str) -> Slot<P> {
        self.push(SlotSpec {
            kind: SlotKind::Inject { name },
            type_name: type_name::<P>(),
            decode: None,
            empty: empty_boxed::<P>,
            create: empty_boxed::<P>,
            inject: Some(inject_boxed::<P>),
        })
    }

    /// The constructor receiving every declared parameter
    pub fn constructor<F>(&mut self, build: F)
    where
        F: Fn(&mut Args) -> Result<T> + Send + Sync + 'static,
    {
        self.constructors.push(Box::new(build));
    }

    fn compile(mut self) -> Result<RecordActivator<T>> {
        let record = type_name::<T>();
        let constructor = match self.constructors.len() {
            0 => {
                return Err(Error::config(format!(
                    "no constructor declared for {}",
                    record
                )))
            }
            1 => self.constructors.remove(0),
            n => {
                return Err(Error::config(format!(
                    "{} constructors declared for {}; exactly one is allowed",
                    n, record
                )))
            }
        };

        let mut keys = FxHashMap::default();
        let mut always = Vec::new();
        let mut network = Vec::new();
        let mut injectables: Vec<(&'static str, usize)> = Vec::new();

        for (index, slot) in self.slots.iter().enumerate() {
            match slot.kind {
                SlotKind::Field {
                    name,
                    always_create,
                } => {
                    if name.is_empty() {
                        return Err(Error::config(format!(
                            "parameter {} of {} has an empty name",
                            index, record
                        )));
                    }
                    if keys.insert(Key::from_static(name), index).is_some() {
                        return Err(Error::config(format!(
                            "duplicate parameter name '{}' in {}",
                            name, record
                        )));
                    }
                    if always_create {
                        always.push(index);
                    }
                }
                SlotKind::Network => network.push(index),
                SlotKind::Inject { name } => {
                    if name.is_empty() || injectables.iter().any(|(n, _)| *n == name) {
                        return Err(Error::config(format!(
                            "invalid or duplicate injectable name '{}' in {}",
                            name, record
                        )));
                    }
                    injectables.push((name, index));
                }
            }
        }

        Ok(RecordActivator {
            slots: self.slots,
            keys,
            always,
            network,
            injectables,
            constructor,
        })
    }
}

// The table holds 'static names; narrowing it to the key's lifetime
// lets a key borrowed from the buffer be looked up directly.
fn find_key<'k>(keys: &FxHashMap<Key<'k>, usize>, key: &Key<'k>) -> Option<usize> {
    keys.get(key).copied()
}

/// Arguments handed to a record constructor, one per declared slot
pub struct Args {
    record: &'static str,
    values: Vec<Option<Boxed>>,
}

impl Args {
    /// Move the value of a slot out
    pub fn take<P: 'static>(&mut self, slot: Slot<P>) -> Result<P> {
        let boxed = self
            .values
            .get_mut(slot.index)
            .and_then(Option::take)
            .ok_or_else(|| {
                Error::config(format!(
                    "parameter {} of {} was already taken or does not exist",
                    slot.index, self.record
                ))
            })?;
        boxed.downcast::<P>().map(|value| *value).map_err(|_| {
            Error::config(format!(
                "parameter {} of {} is not a {}",
                slot.index,
                self.record,
                type_name::<P>()
            ))
        })
    }
}

/// Compiled construction plan of one record type
pub struct RecordActivator<T> {
    slots: Vec<SlotSpec>,
    keys: FxHashMap<Key<'static>, usize>,
    always: Vec<usize>,
    network: Vec<usize>,
    injectables: Vec<(&'static str, usize)>,
    constructor: Constructor<T>,
}

impl<T: Record> RecordActivator<T> {
    /// Compile the schema declared by `T`
    pub fn build() -> Result<Self> {
        let mut schema = Schema::new();
        T::schema(&mut schema);
        schema.compile()
    }

    /// Number of declared parameters
    pub fn parameter_count(&self) -> usize {
        self.slots.len()
    }

    /// Slot index bound to a map key, if any
    pub fn parameter_for(&self, key: &Key<'_>) -> Option<usize> {
        find_key(&self.keys, key)
    }

    fn unset(&self) -> Vec<Option<Boxed>> {
        (0..self.slots.len()).map(|_| None).collect()
    }

    /// Decode a map at `offset` into `T`.
    ///
    /// Unknown keys are skipped. A value whose type does not fit its
    /// parameter is skipped too and the parameter keeps its default.
    pub fn decode(&self, d: &Decoder<'_>, offset: usize, ctx: &DecodeContext<'_>) -> Result<(T, usize)> {
        let field = d.field(offset)?;
        if field.tag != TypeTag::Map {
            return Err(field.mismatch(type_name::<T>()));
        }
        let child = ctx.descend()?;
        let mut values = self.unset();
        let mut cursor = field.data;

        for _ in 0..field.size {
            let (key, used) = d.read_key(cursor)?;
            cursor += used;

            let target = self
                .parameter_for(&key)
                .and_then(|i| self.slots[i].decode.map(|decode| (i, decode)));
            match target {
                Some((index, decode)) => match decode(d, cursor, &child) {
                    Ok((value, used)) => {
                        values[index] = Some(value);
                        cursor += used;
                    }
                    Err(Error::TypeMismatch { expected, found }) => {
                        log::debug!(
                            "{}: ignoring {:?}, expected {} but found {}",
                            type_name::<T>(),
                            key,
                            expected,
                            found
                        );
                        cursor += d.skip(cursor)?;
                    }
                    Err(e) => return Err(e),
                },
                None => {
                    log::trace!("{}: skipping unmatched key {:?}", type_name::<T>(), key);
                    cursor += d.skip(cursor)?;
                }
            }
        }

        let record = self.activate(values, &child)?;
        Ok((record, field.consumed(cursor)))
    }

    /// Build `T` as if decoded from an empty map
    pub fn create_default(&self, ctx: &DecodeContext<'_>) -> Result<T> {
        let child = ctx.descend()?;
        self.activate(self.unset(), &child)
    }

    fn activate(&self, mut values: Vec<Option<Boxed>>, ctx: &DecodeContext<'_>) -> Result<T> {
        for &index in &self.always {
            if values[index].is_none() {
                values[index] = Some((self.slots[index].create)(ctx)?);
            }
        }

        if let Some(network) = ctx.network() {
            for &index in &self.network {
                values[index] = Some(Box::new(Some(network)));
            }
        }

        if let Some(injectables) = ctx.injectables() {
            for &(name, index) in &self.injectables {
                let Some(raw) = injectables.get(name) else {
                    continue;
                };
                let slot = &self.slots[index];
                let value = slot.inject.and_then(|inject| inject(raw)).ok_or_else(|| {
                    Error::config(format!(
                        "injectable '{}' for {} is not a {}",
                        name,
                        type_name::<T>(),
                        slot.type_name
                    ))
                })?;
                values[index] = Some(value);
            }
        }

        for (value, slot) in values.iter_mut().zip(&self.slots) {
            if value.is_none() {
                *value = Some((slot.empty)(ctx)?);
            }
        }

        let mut args = Args {
            record: type_name::<T>(),
            values,
        };
        (self.constructor)(&mut args)
    }
}

impl<T> fmt::Debug for RecordActivator<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordActivator")
            .field("record", &type_name::<T>())
            .field(
                "parameters",
                &self
                    .slots
                    .iter()
                    .map(|s| (s.kind, s.type_name))
                    .collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl<T: Record> Decode for T {
    fn decode(d: &Decoder<'_>, offset: usize, ctx: &DecodeContext<'_>) -> Result<(Self, usize)> {
        ctx.registry().activator::<T>()?.decode(d, offset, ctx)
    }

    fn empty(ctx: &DecodeContext<'_>) -> Result<Self> {
        ctx.registry().activator::<T>()?.create_default(ctx)
    }
}
