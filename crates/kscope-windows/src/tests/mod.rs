//! Simulated kernel shared by the engine tests.

use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::{Mutex, MutexGuard},
    thread,
};

use indexmap::IndexMap;
use kscope_core::{
    AccessMode, CallerMemory, FileNameQuery, Handle, HandleAttributes, HandleTableServices,
    IoServices, KernelFingerprint, KernelInformation, KernelMemory, LengthStatus, NativeResult,
    ObjectAttributes, ObjectInformationClass, ObjectKind, ObjectServices, PointerWidth, ProcessId,
    ProcessInformationClass, ProcessServices, SectionInformationClass, SectionServices, Status,
    ThreadInformationClass, UnicodeString, Va,
};
use zerocopy::IntoBytes as _;

use crate::{
    WindowsKernel,
    dyndata::{DYN_CONFIGURATION_VERSION, DynConfiguration},
    layout::{DEVICE_OBJECT, FILE_OBJECT, OBJECT_HEADER},
};

///////////////////////////////////////////////////////////////////////////////
// Constants
///////////////////////////////////////////////////////////////////////////////

pub const SYSTEM: Va = Va(0xffff_c000_0000_1000);
pub const CALLER: Va = Va(0xffff_c000_0000_3000);
pub const TARGET: Va = Va(0xffff_c000_0000_5000);

pub const SYSTEM_PID: ProcessId = ProcessId(4);
pub const CALLER_PID: ProcessId = ProcessId(0x1000);
pub const TARGET_PID: ProcessId = ProcessId(0x2000);

/// Handle to [`TARGET`] in the caller's handle table.
pub const TARGET_HANDLE: Handle = Handle(0x40);

/// Handle to [`SYSTEM`] in the caller's handle table.
pub const SYSTEM_HANDLE: Handle = Handle(0x44);

pub const EP_OBJECT_TABLE: u32 = 0x570;
pub const HT_HANDLE_CONTENTION_EVENT: u32 = 0x30;
pub const OB_DECODE_SHIFT: u32 = 16;
pub const OB_ATTRIBUTES_SHIFT: u32 = 17;
pub const OT_NAME: u32 = 0x10;
pub const OT_INDEX: u32 = 0x28;
pub const EGE_GUID: u32 = 0x18;
pub const ERE_GUID_ENTRY: u32 = 0x20;

pub const FINGERPRINT: KernelFingerprint = KernelFingerprint {
    class: KernelFingerprint::CLASS_NTOSKRNL,
    machine: KernelFingerprint::MACHINE_AMD64,
    time_date_stamp: 0x5f3e_1c2a,
    size_of_image: 0x0104_6000,
};

pub const FINGERPRINT_I386: KernelFingerprint = KernelFingerprint {
    machine: KernelFingerprint::MACHINE_I386,
    ..FINGERPRINT
};

const PROCESS_ALL_ACCESS: u32 = 0x001f_ffff;
const PROCESS_SIZE: usize = 0x1000;
const HANDLE_TABLE_SIZE: usize = 0x1000;
const HANDLE_TABLE_ENTRIES: u64 = 0x100;
const OBJECT_SIZE: usize = 0x200;
const TYPE_SIZE: usize = 0x100;
const POOL_BASE: u64 = 0xffff_b000_0000_0000;
const VIEW_BASE: u64 = 0x0000_7ff0_0000_0000;

/// Returns a configuration matching [`FINGERPRINT`].
pub fn configuration() -> DynConfiguration {
    configuration_for(FINGERPRINT)
}

/// Returns a configuration with the test offsets for `fingerprint`.
pub fn configuration_for(fingerprint: KernelFingerprint) -> DynConfiguration {
    let fields = [
        ("EpObjectTable", EP_OBJECT_TABLE),
        ("HtHandleContentionEvent", HT_HANDLE_CONTENTION_EVENT),
        ("ObDecodeShift", OB_DECODE_SHIFT),
        ("ObAttributesShift", OB_ATTRIBUTES_SHIFT),
        ("OtName", OT_NAME),
        ("OtIndex", OT_INDEX),
        ("EgeGuid", EGE_GUID),
        ("EreGuidEntry", ERE_GUID_ENTRY),
    ];

    DynConfiguration {
        version: DYN_CONFIGURATION_VERSION,
        fingerprint,
        fields: fields
            .into_iter()
            .map(|(name, offset)| (name.to_owned(), offset))
            .collect::<IndexMap<_, _>>(),
    }
}

/// Returns an engine over a fresh mock with [`configuration`] loaded.
pub fn kernel() -> WindowsKernel<MockKernel> {
    kernel_for(FINGERPRINT)
}

/// Returns an engine over a fresh mock of the kernel identified by
/// `fingerprint`, with the matching configuration loaded.
pub fn kernel_for(fingerprint: KernelFingerprint) -> WindowsKernel<MockKernel> {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::TRACE)
        .with_test_writer()
        .try_init();

    let kernel = WindowsKernel::new(MockKernel::with_fingerprint(fingerprint));
    assert!(kernel.load_configuration(&configuration_for(fingerprint), true));
    kernel
}

/// Encodes a 64-bit handle table entry value the way the kernel does.
///
/// The entry is created unlocked.
pub fn encode_entry(header: Va, attributes: HandleAttributes) -> u64 {
    ((header.0 >> 4) << 20) | ((attributes.bits() as u64 & 0x3) << OB_ATTRIBUTES_SHIFT) | 1
}

/// Writes a name result the way the native name queries do.
pub fn emit_name(buffer: &mut [u8], header: usize, name: &[u16]) -> NativeResult {
    let data = name.as_bytes();
    let required = header + data.len();

    if buffer.len() < required {
        return Err(LengthStatus::new(Status::BufferOverflow, required as u32));
    }

    let string = UnicodeString::new(
        data.len() as u16,
        Va(buffer.as_ptr() as u64 + header as u64),
    );

    buffer[..header].fill(0);
    buffer[..UnicodeString::SIZE].copy_from_slice(string.as_bytes());
    buffer[header..required].copy_from_slice(data);
    Ok(required as u32)
}

/// Decodes a name result copied to the caller.
pub fn parse_name(bytes: &[u8]) -> (UnicodeString, String) {
    let header = UnicodeString::parse(bytes).expect("name header");
    let start = bytes.len() - header.length as usize;
    let chars: Vec<u16> = bytes[start..]
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();

    (header, String::from_utf16(&chars).expect("utf-16 name"))
}

///////////////////////////////////////////////////////////////////////////////
// Mock Kernel
///////////////////////////////////////////////////////////////////////////////

/// Something the engine did to the simulated kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Attach(Va),
    Detach(Va),
    Reference(Va),
    Dereference(Va),
    ExitSyncAcquire(Va),
    ExitSyncRelease(Va),
    Open(Handle),
    Duplicate(Handle),
    Close(Handle),
    Map(Va),
    Unmap(Va),
    VpbAcquire,
    VpbRelease,
}

/// A native query selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeQuery {
    Object(ObjectInformationClass),
    Process(ProcessInformationClass),
    Thread(ThreadInformationClass),
    Section(SectionInformationClass),
}

/// The canned result of a native query.
#[derive(Debug, Clone)]
pub enum NativeData {
    /// A fixed-size record.
    Fixed(Vec<u8>),

    /// A `UNICODE_STRING` inside a header of the given size, followed by
    /// the name.
    Named(usize, Vec<u16>),
}

#[derive(Debug, Clone, Copy)]
pub struct MockHandle {
    pub object: Va,
    pub granted: u32,
}

#[derive(Debug, Clone)]
pub struct Opened {
    pub object: Va,
    pub handle: Handle,
    pub attributes: ObjectAttributes,
    pub access: u32,
    pub kind: ObjectKind,
    pub mode: AccessMode,
}

#[derive(Default)]
pub struct State {
    memory: BTreeMap<u64, Vec<u8>>,
    caller: BTreeMap<u64, Vec<u8>>,
    next_pool: u64,
    next_handle: u64,
    next_view: u64,

    pub reads: Vec<(Va, usize)>,
    pub events: Vec<Event>,
    pub attached: Vec<Va>,
    pub native_contexts: Vec<Va>,
    pub references: HashMap<Va, i64>,
    pub unblocks: Vec<Va>,

    pub pids: HashMap<Va, ProcessId>,
    pub image_names: HashMap<ProcessId, Vec<u16>>,
    pub exiting: HashSet<Va>,
    pub exit_sync: HashMap<Va, i64>,

    pub handles: HashMap<(Va, Handle), MockHandle>,
    pub tables: HashMap<Va, Vec<(Va, Handle)>>,

    pub kinds: HashMap<Va, ObjectKind>,
    pub types: HashMap<Va, Va>,
    pub names: HashMap<Va, Vec<u16>>,
    pub natives: Vec<(NativeQuery, Va, NativeData)>,

    pub attributes_set: Vec<(Va, Handle, HandleAttributes, AccessMode)>,
    pub opened: Vec<Opened>,

    pub sections: HashMap<Va, Vec<u16>>,
    pub views: HashMap<Va, Va>,

    pub filter_names: HashMap<Va, (Vec<u16>, bool)>,
    pub filter_queries: Vec<(Va, FileNameQuery)>,
    pub top_level_irp: bool,
    pub apcs_disabled: bool,
    pub attached_devices: HashMap<Va, Va>,
    pub related_devices: HashMap<Va, Va>,
}

/// Finds the region holding `len` bytes at `va`.
fn region(memory: &BTreeMap<u64, Vec<u8>>, va: Va, len: usize) -> Option<(u64, usize)> {
    let (&base, data) = memory.range(..=va.0).next_back()?;
    let offset = (va.0 - base) as usize;
    (offset + len <= data.len()).then_some((base, offset))
}

impl State {
    fn context(&self) -> Va {
        self.attached.last().copied().unwrap_or(CALLER)
    }

    fn resolve(&self, handle: Handle, mode: AccessMode) -> Result<MockHandle, Status> {
        if handle == Handle::CURRENT_PROCESS {
            return Ok(MockHandle {
                object: self.context(),
                granted: PROCESS_ALL_ACCESS,
            });
        }

        let key = if handle.is_kernel() {
            if mode == AccessMode::UserMode {
                return Err(Status::InvalidHandle);
            }

            (SYSTEM, handle)
        }
        else {
            (self.context(), handle)
        };

        self.handles.get(&key).copied().ok_or(Status::InvalidHandle)
    }

    fn allocate_handle(&mut self, process: Va, kernel: bool, object: Va, granted: u32) -> Handle {
        self.next_handle += 4;
        let handle = Handle(0x1000 + self.next_handle);

        let (process, handle) = if kernel {
            (SYSTEM, handle.to_kernel())
        }
        else {
            (process, handle)
        };

        self.handles
            .insert((process, handle), MockHandle { object, granted });
        handle
    }

    fn native(&mut self, query: NativeQuery, handle: Handle, buffer: &mut [u8]) -> NativeResult {
        let context = self.context();
        self.native_contexts.push(context);

        let object = self.resolve(handle, AccessMode::KernelMode)?.object;
        let data = self
            .natives
            .iter()
            .find(|(q, o, _)| *q == query && *o == object)
            .map(|(_, _, data)| data.clone())
            .ok_or(Status::NotSupported)?;

        match data {
            NativeData::Fixed(data) => {
                if buffer.len() < data.len() {
                    return Err(LengthStatus::new(
                        Status::InfoLengthMismatch,
                        data.len() as u32,
                    ));
                }

                buffer[..data.len()].copy_from_slice(&data);
                Ok(data.len() as u32)
            }
            NativeData::Named(header, name) => emit_name(buffer, header, &name),
        }
    }
}

pub struct MockKernel {
    fingerprint: KernelFingerprint,
    state: Mutex<State>,
}

impl MockKernel {
    pub fn new() -> Self {
        Self::with_fingerprint(FINGERPRINT)
    }

    pub fn with_fingerprint(fingerprint: KernelFingerprint) -> Self {
        let mock = Self {
            fingerprint,
            state: Mutex::new(State {
                next_pool: POOL_BASE,
                next_view: VIEW_BASE,
                ..Default::default()
            }),
        };

        for (process, pid) in [(SYSTEM, SYSTEM_PID), (CALLER, CALLER_PID), (TARGET, TARGET_PID)] {
            mock.map(process, PROCESS_SIZE);

            let mut state = mock.state();
            state.pids.insert(process, pid);
            state.kinds.insert(process, ObjectKind::Process);
        }

        mock.insert_handle(CALLER, TARGET_HANDLE, TARGET, PROCESS_ALL_ACCESS);
        mock.insert_handle(CALLER, SYSTEM_HANDLE, SYSTEM, PROCESS_ALL_ACCESS);
        mock
    }

    pub fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().expect("mock state")
    }

    ///////////////////////////////////////////////////////////////////////////
    // Memory setup
    ///////////////////////////////////////////////////////////////////////////

    /// Maps `len` zeroed bytes of kernel memory at `va`.
    pub fn map(&self, va: Va, len: usize) {
        self.state().memory.insert(va.0, vec![0u8; len]);
    }

    /// Returns a fresh, unmapped address with room for `len` bytes and an
    /// object header in front of it.
    pub fn reserve(&self, len: usize) -> Va {
        let mut state = self.state();
        let va = Va(state.next_pool + 0x100);
        state.next_pool += (len as u64 + 0x100 + 0xfff) & !0xfff;
        va
    }

    /// Maps `len` zeroed bytes of kernel memory at a fresh address.
    pub fn alloc(&self, len: usize) -> Va {
        let va = self.reserve(len);
        self.map(va, len);
        va
    }

    /// Allocates a UTF-16 string and returns its address and length in bytes.
    pub fn alloc_string(&self, value: &str) -> (Va, u16) {
        let data: Vec<u16> = value.encode_utf16().collect();
        let va = self.alloc(data.len() * 2 + 2);
        self.write(va, data.as_bytes());
        (va, (data.len() * 2) as u16)
    }

    pub fn write(&self, va: Va, data: &[u8]) {
        let mut state = self.state();
        let (base, offset) = region(&state.memory, va, data.len())
            .unwrap_or_else(|| panic!("no kernel memory at {va}"));

        let region = state.memory.get_mut(&base).expect("region");
        region[offset..offset + data.len()].copy_from_slice(data);
    }

    pub fn write_u8(&self, va: Va, value: u8) {
        self.write(va, &[value]);
    }

    pub fn write_u16(&self, va: Va, value: u16) {
        self.write(va, &value.to_le_bytes());
    }

    pub fn write_u32(&self, va: Va, value: u32) {
        self.write(va, &value.to_le_bytes());
    }

    pub fn write_u64(&self, va: Va, value: u64) {
        self.write(va, &value.to_le_bytes());
    }

    pub fn read_u64_raw(&self, va: Va) -> u64 {
        let mut buffer = [0u8; 8];
        self.read(va, &mut buffer).expect("kernel memory");
        u64::from_le_bytes(buffer)
    }

    /// Maps a zeroed caller buffer.
    pub fn map_caller(&self, va: Va, len: usize) {
        self.state().caller.insert(va.0, vec![0u8; len]);
    }

    /// Returns the contents of a caller buffer.
    pub fn caller_bytes(&self, va: Va, len: usize) -> Vec<u8> {
        let mut data = vec![0u8; len];
        self.copy_from_caller(va, &mut data).expect("caller memory");
        data
    }

    pub fn caller_u32(&self, va: Va) -> u32 {
        let data = self.caller_bytes(va, 4);
        u32::from_le_bytes([data[0], data[1], data[2], data[3]])
    }

    pub fn caller_u64(&self, va: Va) -> u64 {
        let data = self.caller_bytes(va, 8);
        u64::from_le_bytes(data.try_into().expect("eight bytes"))
    }

    ///////////////////////////////////////////////////////////////////////////
    // Object setup
    ///////////////////////////////////////////////////////////////////////////

    /// Adds an object with its header at `va - 0x30`.
    pub fn add_object(&self, va: Va, kind: Option<ObjectKind>, object_type: Option<Va>) {
        self.map(va - OBJECT_HEADER.Body.offset(), OBJECT_SIZE);

        let mut state = self.state();
        if let Some(kind) = kind {
            state.kinds.insert(va, kind);
        }

        if let Some(object_type) = object_type {
            state.types.insert(va, object_type);
        }
    }

    /// Adds an object type descriptor.
    pub fn add_type(&self, va: Va, index: u8, name: &str) {
        self.map(va, TYPE_SIZE);
        self.write_u8(va + OT_INDEX as u64, index);

        let (buffer, length) = self.alloc_string(name);
        self.write_u16(va + OT_NAME as u64, length);
        self.write_u16(va + OT_NAME as u64 + 2, length);
        self.write_u64(va + OT_NAME as u64 + 8, buffer.0);
    }

    /// Sets `_OBJECT_HEADER.Flags`.
    pub fn set_header_flags(&self, object: Va, flags: u8) {
        let header = object - OBJECT_HEADER.Body.offset();
        self.write_u8(header + OBJECT_HEADER.Flags.offset(), flags);
    }

    pub fn set_name(&self, object: Va, name: &str) {
        self.state().names.insert(object, name.encode_utf16().collect());
    }

    pub fn set_native(&self, query: NativeQuery, object: Va, data: NativeData) {
        self.state().natives.push((query, object, data));
    }

    pub fn add_process(&self, process: Va, pid: ProcessId) {
        self.map(process, PROCESS_SIZE);

        let mut state = self.state();
        state.pids.insert(process, pid);
        state.kinds.insert(process, ObjectKind::Process);
    }

    /// Adds a device object owned by `driver`.
    pub fn add_device(&self, driver: Va, name: &str) -> Va {
        let device = self.reserve(OBJECT_SIZE);
        self.add_object(device, Some(ObjectKind::Device), None);
        self.write_u64(device + DEVICE_OBJECT.DriverObject.offset(), driver.0);
        self.set_name(device, name);
        device
    }

    /// Adds a file object.
    pub fn add_file(&self, file: Va, device: Va, related: Va, name: Option<&str>) {
        self.add_object(file, Some(ObjectKind::File), None);
        self.write_u64(file + FILE_OBJECT.DeviceObject.offset(), device.0);
        self.write_u64(file + FILE_OBJECT.RelatedFileObject.offset(), related.0);

        if let Some(name) = name {
            let (buffer, length) = self.alloc_string(name);
            let file_name = file + FILE_OBJECT.FileName.offset();
            self.write_u16(file_name, length);
            self.write_u16(file_name + 2, length);
            self.write_u64(file_name + 8, buffer.0);
        }
    }

    ///////////////////////////////////////////////////////////////////////////
    // Handle setup
    ///////////////////////////////////////////////////////////////////////////

    /// Gives `process` an empty handle table.
    pub fn add_handle_table(&self, process: Va) -> Va {
        let table = self.alloc(HANDLE_TABLE_SIZE);
        self.write_u64(process + EP_OBJECT_TABLE as u64, table.0);
        self.state().tables.insert(table, Vec::new());
        table
    }

    /// Adds a handle to the handle map of `process`, and to its handle
    /// table if it has one.
    pub fn insert_handle(&self, process: Va, handle: Handle, object: Va, granted: u32) {
        self.insert_handle_with(process, handle, object, granted, HandleAttributes::empty());
    }

    pub fn insert_handle_with(
        &self,
        process: Va,
        handle: Handle,
        object: Va,
        granted: u32,
        attributes: HandleAttributes,
    ) {
        self.state()
            .handles
            .insert((process, handle), MockHandle { object, granted });

        let table = {
            let mut buffer = [0u8; 8];
            if self
                .read(process + EP_OBJECT_TABLE as u64, &mut buffer)
                .is_err()
            {
                return;
            }

            Va(u64::from_le_bytes(buffer))
        };

        if table.is_null() {
            return;
        }

        let index = self.state().tables.get(&table).map_or(0, Vec::len) as u64;
        assert!(index < HANDLE_TABLE_ENTRIES, "handle table full");

        let entry = table + 0x100 + index * 0x10;
        let header = if object.is_null() {
            Va(0)
        }
        else {
            object - OBJECT_HEADER.Body.offset()
        };

        let value = if header.is_null() {
            1
        }
        else {
            encode_entry(header, attributes)
        };

        self.write_u64(entry, value);
        self.write_u32(entry + 8, granted);
        self.state()
            .tables
            .entry(table)
            .or_default()
            .push((entry, handle));
    }

    /// Returns the entries of a handle table.
    pub fn entries(&self, table: Va) -> Vec<(Va, Handle)> {
        self.state().tables.get(&table).cloned().unwrap_or_default()
    }

    /// Checks whether every entry of a handle table is unlocked.
    pub fn all_unlocked(&self, table: Va) -> bool {
        self.entries(table)
            .into_iter()
            .all(|(entry, _)| self.read_u64_raw(entry) & 1 == 1)
    }

    ///////////////////////////////////////////////////////////////////////////
    // Observation
    ///////////////////////////////////////////////////////////////////////////

    pub fn events(&self) -> Vec<Event> {
        self.state().events.clone()
    }

    pub fn clear_events(&self) {
        let mut state = self.state();
        state.events.clear();
        state.reads.clear();
        state.native_contexts.clear();
    }

    /// Checks that every reference, attach and exit barrier was released.
    pub fn balanced(&self) -> bool {
        let state = self.state();
        state.attached.is_empty()
            && state.references.values().all(|&count| count == 0)
            && state.exit_sync.values().all(|&count| count == 0)
    }

    /// Clears the unlocked bit of an entry, waiting for its holder first.
    fn lock_entry(&self, entry: Va) {
        loop {
            {
                let mut state = self.state();
                let (base, offset) = region(&state.memory, entry, 8).expect("handle table entry");
                let region = state.memory.get_mut(&base).expect("region");
                let bytes = &mut region[offset..offset + 8];

                let value = u64::from_le_bytes(bytes.try_into().expect("eight bytes"));
                if value & 1 == 1 {
                    bytes.copy_from_slice(&(value & !1).to_le_bytes());
                    return;
                }
            }

            thread::yield_now();
        }
    }
}

///////////////////////////////////////////////////////////////////////////////
// Backend
///////////////////////////////////////////////////////////////////////////////

impl KernelMemory for MockKernel {
    fn read(&self, va: Va, buffer: &mut [u8]) -> Result<(), Status> {
        let mut state = self.state();
        state.reads.push((va, buffer.len()));

        let (base, offset) = region(&state.memory, va, buffer.len())
            .ok_or(Status::AccessViolation(va))?;

        buffer.copy_from_slice(&state.memory[&base][offset..offset + buffer.len()]);
        Ok(())
    }

    fn interlocked_exchange_add(
        &self,
        va: Va,
        value: u64,
        width: PointerWidth,
    ) -> Result<u64, Status> {
        let mut state = self.state();
        let size = width.size();
        let (base, offset) = region(&state.memory, va, size)
            .ok_or(Status::AccessViolation(va))?;

        let region = state.memory.get_mut(&base).expect("region");
        let mut bytes = [0u8; 8];
        bytes[..size].copy_from_slice(&region[offset..offset + size]);

        let previous = u64::from_le_bytes(bytes);
        let next = previous.wrapping_add(value).to_le_bytes();
        region[offset..offset + size].copy_from_slice(&next[..size]);
        Ok(previous)
    }
}

impl CallerMemory for MockKernel {
    fn copy_to_caller(&self, va: Va, data: &[u8]) -> Result<(), Status> {
        let mut state = self.state();
        let (base, offset) = region(&state.caller, va, data.len())
            .ok_or(Status::AccessViolation(va))?;

        let region = state.caller.get_mut(&base).expect("region");
        region[offset..offset + data.len()].copy_from_slice(data);
        Ok(())
    }

    fn copy_from_caller(&self, va: Va, data: &mut [u8]) -> Result<(), Status> {
        let state = self.state();
        let (base, offset) = region(&state.caller, va, data.len())
            .ok_or(Status::AccessViolation(va))?;

        data.copy_from_slice(&state.caller[&base][offset..offset + data.len()]);
        Ok(())
    }
}

impl KernelInformation for MockKernel {
    fn kernel_fingerprint(&self) -> KernelFingerprint {
        self.fingerprint
    }

    fn current_process(&self) -> Va {
        CALLER
    }

    fn initial_system_process(&self) -> Va {
        SYSTEM
    }

    fn process_id(&self, process: Va) -> ProcessId {
        self.state().pids.get(&process).copied().unwrap_or_default()
    }
}

impl ProcessServices for MockKernel {
    type ApcState = Va;

    fn acquire_process_exit_synchronization(&self, process: Va) -> Result<(), Status> {
        let mut state = self.state();
        if state.exiting.contains(&process) {
            return Err(Status::Native(0xc000_010a));
        }

        *state.exit_sync.entry(process).or_default() += 1;
        state.events.push(Event::ExitSyncAcquire(process));
        Ok(())
    }

    fn release_process_exit_synchronization(&self, process: Va) {
        let mut state = self.state();
        *state.exit_sync.entry(process).or_default() -= 1;
        state.events.push(Event::ExitSyncRelease(process));
    }

    fn stack_attach_process(&self, process: Va) -> Self::ApcState {
        let mut state = self.state();
        state.attached.push(process);
        state.events.push(Event::Attach(process));
        process
    }

    fn unstack_detach_process(&self, process: Self::ApcState) {
        let mut state = self.state();
        assert_eq!(state.attached.pop(), Some(process), "unbalanced detach");
        state.events.push(Event::Detach(process));
    }

    fn process_image_file_name(&self, process_id: ProcessId) -> Option<Vec<u16>> {
        self.state().image_names.get(&process_id).cloned()
    }

    fn query_information_process(
        &self,
        handle: Handle,
        class: ProcessInformationClass,
        buffer: &mut [u8],
    ) -> NativeResult {
        self.state()
            .native(NativeQuery::Process(class), handle, buffer)
    }

    fn query_information_thread(
        &self,
        handle: Handle,
        class: ThreadInformationClass,
        buffer: &mut [u8],
    ) -> NativeResult {
        self.state()
            .native(NativeQuery::Thread(class), handle, buffer)
    }
}

impl HandleTableServices for MockKernel {
    fn enum_handle_table(
        &self,
        table: Va,
        callback: &mut dyn FnMut(Va, Handle) -> bool,
    ) -> bool {
        for (entry, handle) in self.entries(table) {
            self.lock_entry(entry);

            if callback(entry, handle) {
                return true;
            }
        }

        false
    }

    fn unblock_push_lock(&self, push_lock: Va) {
        self.state().unblocks.push(push_lock);
    }
}

impl ObjectServices for MockKernel {
    fn reference_object_by_handle(
        &self,
        handle: Handle,
        desired_access: u32,
        kind: Option<ObjectKind>,
        mode: AccessMode,
    ) -> Result<Va, Status> {
        let mut state = self.state();
        let entry = state.resolve(handle, mode)?;

        if let Some(kind) = kind {
            if state.kinds.get(&entry.object) != Some(&kind) {
                return Err(Status::ObjectTypeMismatch);
            }
        }

        if mode == AccessMode::UserMode && entry.granted & desired_access != desired_access {
            return Err(Status::AccessDenied);
        }

        *state.references.entry(entry.object).or_default() += 1;
        state.events.push(Event::Reference(entry.object));
        Ok(entry.object)
    }

    fn dereference_object(&self, object: Va) {
        let mut state = self.state();
        *state.references.entry(object).or_default() -= 1;
        state.events.push(Event::Dereference(object));
    }

    fn object_type(&self, object: Va) -> Option<Va> {
        self.state().types.get(&object).copied()
    }

    fn object_kind(&self, object: Va) -> Option<ObjectKind> {
        self.state().kinds.get(&object).copied()
    }

    fn query_name_string(&self, object: Va, buffer: &mut [u8]) -> NativeResult {
        let name = self.state().names.get(&object).cloned().unwrap_or_default();
        emit_name(buffer, UnicodeString::SIZE, &name).map_err(|err| {
            LengthStatus::new(Status::InfoLengthMismatch, err.required)
        })
    }

    fn query_object(
        &self,
        handle: Handle,
        class: ObjectInformationClass,
        buffer: &mut [u8],
    ) -> NativeResult {
        self.state()
            .native(NativeQuery::Object(class), handle, buffer)
    }

    fn set_handle_attributes(
        &self,
        handle: Handle,
        attributes: HandleAttributes,
        mode: AccessMode,
    ) -> Result<(), Status> {
        let mut state = self.state();
        state.resolve(handle, mode)?;

        let context = state.context();
        state
            .attributes_set
            .push((context, handle, attributes, mode));
        Ok(())
    }

    fn open_object_by_pointer(
        &self,
        object: Va,
        attributes: ObjectAttributes,
        desired_access: u32,
        kind: ObjectKind,
        mode: AccessMode,
    ) -> Result<Handle, Status> {
        let mut state = self.state();
        if state.kinds.get(&object) != Some(&kind) {
            return Err(Status::ObjectTypeMismatch);
        }

        let context = state.context();
        let kernel = attributes.contains(ObjectAttributes::KERNEL_HANDLE);
        let handle = state.allocate_handle(context, kernel, object, desired_access);

        state.opened.push(Opened {
            object,
            handle,
            attributes,
            access: desired_access,
            kind,
            mode,
        });
        state.events.push(Event::Open(handle));
        Ok(handle)
    }

    fn duplicate_object(
        &self,
        source_process: Va,
        source_handle: Handle,
        target_process: Va,
        desired_access: u32,
        attributes: ObjectAttributes,
        _mode: AccessMode,
    ) -> Result<Handle, Status> {
        let mut state = self.state();

        let key = if source_handle.is_kernel() {
            (SYSTEM, source_handle)
        }
        else {
            (source_process, source_handle)
        };

        let source = state
            .handles
            .get(&key)
            .copied()
            .ok_or(Status::InvalidHandle)?;

        let kernel = attributes.contains(ObjectAttributes::KERNEL_HANDLE);
        let handle = state.allocate_handle(target_process, kernel, source.object, desired_access);
        state.events.push(Event::Duplicate(handle));
        Ok(handle)
    }

    fn close_handle(&self, handle: Handle, _mode: AccessMode) {
        let mut state = self.state();

        let key = if handle.is_kernel() {
            (SYSTEM, handle)
        }
        else {
            (state.context(), handle)
        };

        state.handles.remove(&key);
        state.events.push(Event::Close(handle));
    }
}

impl SectionServices for MockKernel {
    fn query_section(
        &self,
        handle: Handle,
        class: SectionInformationClass,
        buffer: &mut [u8],
    ) -> NativeResult {
        self.state()
            .native(NativeQuery::Section(class), handle, buffer)
    }

    fn map_view_of_section(&self, section: Handle) -> Result<Va, Status> {
        let mut state = self.state();
        let section = state.resolve(section, AccessMode::KernelMode)?.object;

        if state.kinds.get(&section) != Some(&ObjectKind::Section) {
            return Err(Status::ObjectTypeMismatch);
        }

        let base = Va(state.next_view);
        state.next_view += 0x10_0000;
        state.views.insert(base, section);
        state.events.push(Event::Map(base));
        Ok(base)
    }

    fn unmap_view_of_section(&self, base: Va) {
        let mut state = self.state();
        state.views.remove(&base);
        state.events.push(Event::Unmap(base));
    }

    fn query_mapped_file_name(&self, base: Va, buffer: &mut [u8]) -> NativeResult {
        let state = self.state();
        let section = state.views.get(&base).ok_or(Status::InvalidParameter)?;
        let name = state.sections.get(section).ok_or(Status::NotFound)?;
        emit_name(buffer, UnicodeString::SIZE, name)
    }
}

impl IoServices for MockKernel {
    fn top_level_irp_present(&self) -> bool {
        self.state().top_level_irp
    }

    fn all_apcs_disabled(&self) -> bool {
        self.state().apcs_disabled
    }

    fn file_name_information(&self, file: Va, query: FileNameQuery) -> Result<Vec<u16>, Status> {
        let mut state = self.state();
        state.filter_queries.push((file, query));

        match state.filter_names.get(&file) {
            Some((name, cached)) if *cached || query == FileNameQuery::Default => Ok(name.clone()),
            Some(_) => Err(Status::NotFound),
            None => Err(Status::NotSupported),
        }
    }

    fn attached_device(&self, device: Va) -> Va {
        self.state()
            .attached_devices
            .get(&device)
            .copied()
            .unwrap_or(device)
    }

    fn related_device_object(&self, file: Va) -> Va {
        self.state()
            .related_devices
            .get(&file)
            .copied()
            .unwrap_or_default()
    }

    fn file_has_user_writable_references(&self, _section_object_pointer: Va) -> bool {
        false
    }

    fn transaction_parameter_block(&self, _file: Va) -> Option<Va> {
        None
    }

    fn is_file_object_ignoring_sharing(&self, _file: Va) -> bool {
        false
    }

    fn acquire_vpb_spin_lock(&self) -> u8 {
        self.state().events.push(Event::VpbAcquire);
        2
    }

    fn release_vpb_spin_lock(&self, irql: u8) {
        assert_eq!(irql, 2);
        self.state().events.push(Event::VpbRelease);
    }
}
