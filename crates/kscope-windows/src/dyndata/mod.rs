//! Build-fingerprinted offsets of undocumented kernel structures.
//!
//! The layout of structures such as `_EPROCESS` or `_HANDLE_TABLE` changes
//! between kernel builds. Offsets are supplied externally as a
//! [`DynConfiguration`], validated against the running kernel and then
//! published as an immutable [`OffsetTable`]. Every consumer goes through
//! [`OffsetTable::get`], which fails closed for fields the table does not
//! know.

use std::{
    str::FromStr,
    sync::{Arc, RwLock},
};

use indexmap::IndexMap;
use kscope_core::{KernelFingerprint, PointerWidth, ProcessId, Status};
use serde::{Deserialize, Serialize};

/// Version of the configuration format this engine understands.
pub const DYN_CONFIGURATION_VERSION: u32 = 13;

/// Sentinel marking a field whose offset is not known for a build.
pub const DYN_UNKNOWN: u32 = u32::MAX;

macro_rules! dyn_fields {
    (
        $(
            $(#[$meta:meta])*
            $name:ident
        ),+ $(,)?
    ) => {
        /// A symbolic field of an undocumented kernel structure.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum DynField {
            $(
                $(#[$meta])*
                $name,
            )+
        }

        impl DynField {
            /// Every known field.
            pub const ALL: &'static [DynField] = &[$(Self::$name),+];

            /// Returns the symbolic name of the field.
            pub const fn as_str(self) -> &'static str {
                match self {
                    $(Self::$name => stringify!($name),)+
                }
            }
        }

        impl FromStr for DynField {
            type Err = DynDataError;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                match value {
                    $(stringify!($name) => Ok(Self::$name),)+
                    _ => Err(DynDataError::UnknownField(value.to_owned())),
                }
            }
        }
    };
}

dyn_fields! {
    /// `_EPROCESS.ObjectTable`
    EpObjectTable,

    /// `_HANDLE_TABLE.HandleContentionEvent`
    HtHandleContentionEvent,

    /// Right shift that recovers the object header from a handle table entry.
    ObDecodeShift,

    /// Right shift that recovers the attribute bits from a handle table entry.
    ObAttributesShift,

    /// `_OBJECT_TYPE.Name`
    OtName,

    /// `_OBJECT_TYPE.Index`
    OtIndex,

    /// `_ETW_GUID_ENTRY.Guid`
    EgeGuid,

    /// `_ETW_REG_ENTRY.GuidEntry`
    EreGuidEntry,
}

impl std::fmt::Display for DynField {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An error that rejects a configuration.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DynDataError {
    /// The configuration signature did not verify.
    #[error("configuration signature is invalid")]
    InvalidSignature,

    /// The configuration was produced for another format version.
    #[error("configuration version {found} is not supported (expected {expected})")]
    UnsupportedVersion {
        /// Version found in the configuration.
        found: u32,

        /// Version this engine understands.
        expected: u32,
    },

    /// The configuration was produced for another kernel build.
    #[error("configuration targets {found:?}, running kernel is {running:?}")]
    FingerprintMismatch {
        /// Fingerprint embedded in the configuration.
        found: KernelFingerprint,

        /// Fingerprint of the running kernel.
        running: KernelFingerprint,
    },

    /// The kernel class or machine type is not supported.
    #[error("unsupported kernel (class: {class:#x}, machine: {machine:#x})")]
    UnsupportedKernel {
        /// Kernel class.
        class: u16,

        /// Machine type.
        machine: u16,
    },

    /// A symbolic field name is not known to this engine.
    #[error("unknown field `{0}`")]
    UnknownField(String),
}

/// A parsed, not yet validated, offset configuration.
///
/// Transport and signature verification of the blob this is parsed from
/// happen outside of the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DynConfiguration {
    /// Configuration format version.
    pub version: u32,

    /// The kernel build the offsets were generated for.
    pub fingerprint: KernelFingerprint,

    /// Symbolic field name to offset. [`DYN_UNKNOWN`] marks unknown fields.
    pub fields: IndexMap<String, u32>,
}

/// A validated offset table for the running kernel.
#[derive(Debug, Clone)]
pub struct OffsetTable {
    fingerprint: KernelFingerprint,
    pointer_width: PointerWidth,
    fields: IndexMap<DynField, u32>,
}

impl OffsetTable {
    /// Validates a configuration against the running kernel.
    pub fn from_configuration(
        config: &DynConfiguration,
        signature_valid: bool,
        running: &KernelFingerprint,
    ) -> Result<Self, DynDataError> {
        if !signature_valid {
            return Err(DynDataError::InvalidSignature);
        }

        if config.version != DYN_CONFIGURATION_VERSION {
            return Err(DynDataError::UnsupportedVersion {
                found: config.version,
                expected: DYN_CONFIGURATION_VERSION,
            });
        }

        if config.fingerprint != *running {
            return Err(DynDataError::FingerprintMismatch {
                found: config.fingerprint,
                running: *running,
            });
        }

        let pointer_width = match running.class {
            KernelFingerprint::CLASS_NTOSKRNL | KernelFingerprint::CLASS_NTKRLA57 => {
                running.pointer_width()
            }
            _ => None,
        }
        .ok_or(DynDataError::UnsupportedKernel {
            class: running.class,
            machine: running.machine,
        })?;

        let mut fields = IndexMap::new();
        for (name, &offset) in &config.fields {
            match name.parse::<DynField>() {
                Ok(field) if offset != DYN_UNKNOWN => {
                    fields.insert(field, offset);
                }
                Ok(_) => {}
                Err(err) => tracing::debug!(%err, "ignoring configuration field"),
            }
        }

        Ok(Self {
            fingerprint: *running,
            pointer_width,
            fields,
        })
    }

    /// Returns the fingerprint of the kernel this table describes.
    pub fn fingerprint(&self) -> &KernelFingerprint {
        &self.fingerprint
    }

    /// Returns the pointer width of the kernel this table describes.
    pub fn pointer_width(&self) -> PointerWidth {
        self.pointer_width
    }

    /// Returns the offset of a field.
    ///
    /// Fails with [`Status::NoInterface`] if the offset is not known.
    pub fn get(&self, field: DynField) -> Result<u32, Status> {
        self.fields.get(&field).copied().ok_or_else(|| {
            tracing::trace!(%field, "offset not available");
            Status::NoInterface
        })
    }

    /// Returns the offset of a field, or `None` if it is not known.
    pub fn try_get(&self, field: DynField) -> Option<u32> {
        self.fields.get(&field).copied()
    }
}

/// Supplies offset configurations when the engine needs to reload them.
pub trait ConfigurationSource {
    /// Returns the current configuration and whether its signature verified.
    fn load(&self) -> Option<(DynConfiguration, bool)>;
}

/// Holds the offset table currently in effect.
///
/// The table is shared read-only by any number of callers and is only ever
/// replaced as a whole. Callers that already hold a table keep using it
/// until they drop it.
#[derive(Debug, Default)]
pub struct OffsetResolver {
    table: RwLock<Option<Arc<OffsetTable>>>,
}

impl OffsetResolver {
    /// Creates a resolver with no table loaded.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the table in effect.
    ///
    /// Fails with [`Status::NoInterface`] if no valid table is loaded.
    pub fn resolve(&self) -> Result<Arc<OffsetTable>, Status> {
        let table = match self.table.read() {
            Ok(table) => table,
            Err(poisoned) => poisoned.into_inner(),
        };

        table.clone().ok_or(Status::NoInterface)
    }

    /// Checks whether a configuration may be applied to the running kernel.
    pub fn validate(
        config: &DynConfiguration,
        signature_valid: bool,
        running: &KernelFingerprint,
    ) -> bool {
        OffsetTable::from_configuration(config, signature_valid, running).is_ok()
    }

    /// Validates a configuration and, if it is accepted, publishes it.
    ///
    /// A rejected configuration unloads the current table, so that no
    /// feature keeps running on offsets that may no longer apply.
    pub fn load(
        &self,
        config: &DynConfiguration,
        signature_valid: bool,
        running: &KernelFingerprint,
    ) -> bool {
        let table = match OffsetTable::from_configuration(config, signature_valid, running) {
            Ok(table) => Some(Arc::new(table)),
            Err(err) => {
                tracing::debug!(%err, "rejecting offset configuration");
                None
            }
        };

        let loaded = table.is_some();
        self.replace(table);
        loaded
    }

    /// Drops the current table.
    pub fn unload(&self) {
        self.replace(None);
    }

    /// Reacts to a failed capability check.
    ///
    /// When the notification names the current process, the configuration
    /// is reloaded from `source` and revalidated. Returns `true` if a valid
    /// table is in effect afterwards.
    pub fn notify_verification_failed(
        &self,
        process_id: ProcessId,
        current_process_id: ProcessId,
        running: &KernelFingerprint,
        source: &impl ConfigurationSource,
    ) -> bool {
        if process_id != current_process_id {
            return self.resolve().is_ok();
        }

        match source.load() {
            Some((config, signature_valid)) => self.load(&config, signature_valid, running),
            None => {
                tracing::debug!(%process_id, "no configuration to reload");
                self.unload();
                false
            }
        }
    }

    fn replace(&self, table: Option<Arc<OffsetTable>>) {
        match self.table.write() {
            Ok(mut current) => *current = table,
            Err(poisoned) => *poisoned.into_inner() = table,
        }
    }
}
