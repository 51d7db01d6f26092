//! The sanitizing heap (spec.md §4.7), grounded on
//! `examples/original_source/src/ir/interpreter/heap.h`/`.cc`. Tracks
//! allocated `[address, address+size)` ranges with per-byte
//! initialization bits, plus a history of freed ranges, so that malloc/
//! free/load/store misuse produces a deterministic diagnostic instead of
//! undefined behavior.
//!
//! When sanitizing is off the heap is a thin wrapper with the same
//! interface but none of the bookkeeping (spec.md §4.7: "the heap is a
//! thin wrapper over raw allocation/free with the same interface but no
//! checks") — it still needs real backing storage, just no range/
//! initialization tracking around it.

use thiserror::Error;

/// A heap misuse, detected only when sanitizing is enabled. These are
/// user-visible failures of the *interpreted* program (spec.md §7: "the
/// sanitizing heap's failure is of the first kind, not the second"), not
/// internal compiler bugs — `Interpreter::step` surfaces them as the
/// program's abort message.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HeapError {
    #[error("attempted malloc with non-positive size")]
    NonPositiveMallocSize,
    #[error("attempted to access memory range that doesn't exist")]
    DoesNotExist,
    #[error("attempted to access memory range that only partially overlaps allocated memory")]
    PartialOverlap,
    #[error("attempted to access memory range that was freed")]
    AccessToFreedMemory,
    #[error("attempted to read uninitialized memory")]
    UninitializedRead,
    #[error("address to be freed does not point to start of allocated block")]
    FreeNotAtBlockStart,
    #[error("memory was already freed")]
    DoubleFree,
    #[error("memory was never allocated")]
    FreeOfUnallocatedMemory,
    #[error("not all memory was freed")]
    LeakedMemory,
}

pub type HeapResult<T> = Result<T, HeapError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct MemoryRange {
    address: i64,
    size: i64,
}

impl MemoryRange {
    fn end(self) -> i64 {
        self.address + self.size
    }

    fn is_address_contained(self, address: i64) -> bool {
        self.address <= address && address < self.end()
    }

    fn contains(self, other: MemoryRange) -> bool {
        self.address <= other.address && other.end() <= self.end()
    }

    fn overlaps(self, other: MemoryRange) -> bool {
        (self.address <= other.address && self.end() > other.address)
            || (other.address <= self.address && other.end() > self.address)
    }
}

#[derive(Debug, Clone)]
struct Allocation {
    range: MemoryRange,
    bytes: Vec<u8>,
    /// One bit per byte; `true` once a store has touched that byte. Only
    /// meaningful (and only consulted) when sanitizing.
    initialized: Vec<bool>,
}

impl Allocation {
    fn new(range: MemoryRange) -> Self {
        Self {
            range,
            bytes: vec![0u8; range.size as usize],
            initialized: vec![false; range.size as usize],
        }
    }
}

/// An interpreter-owned heap of logically-addressed allocations, address-
/// keyed rather than pointer-typed (spec.md §9: "keep an opaque `Address
/// = u64`... this keeps IR execution independent of the host allocator's
/// address layout"). Addresses are handed out by a monotonically
/// increasing counter rather than the host's `malloc`, since the
/// interpreter never dereferences them through real host memory — every
/// access goes through `load`/`store`.
#[derive(Debug)]
pub struct Heap {
    sanitize: bool,
    allocated: Vec<Allocation>,
    freed: Vec<MemoryRange>,
    next_address: i64,
    /// Backing storage used only when `!sanitize`: a flat, unchecked byte
    /// space addressed directly, matching the original's "no checks, just
    /// write through the pointer" behavior (spec.md §4.7).
    flat_memory: std::collections::HashMap<i64, u8>,
}

const FIRST_ADDRESS: i64 = 0x1000;

impl Heap {
    pub fn new(sanitize: bool) -> Self {
        Self {
            sanitize,
            allocated: Vec::new(),
            freed: Vec::new(),
            next_address: FIRST_ADDRESS,
            flat_memory: std::collections::HashMap::new(),
        }
    }

    pub fn is_sanitizing(&self) -> bool {
        self.sanitize
    }

    pub fn malloc(&mut self, size: i64) -> HeapResult<i64> {
        if self.sanitize && size <= 0 {
            return Err(HeapError::NonPositiveMallocSize);
        }
        let size = size.max(0);
        let address = self.next_address;
        self.next_address += size.max(1);
        if self.sanitize {
            self.allocated.push(Allocation::new(MemoryRange { address, size }));
        }
        Ok(address)
    }

    pub fn free(&mut self, address: i64) -> HeapResult<()> {
        if !self.sanitize {
            return Ok(());
        }
        if let Err(err) = self.check_can_be_freed(address) {
            log::warn!("heap sanitizer: free(0x{address:x}) rejected: {err}");
            return Err(err);
        }
        let index = self
            .allocated
            .iter()
            .position(|a| a.range.address == address)
            .expect("check_can_be_freed validated this address exists");
        let range = self.allocated.remove(index).range;
        self.freed.push(range);
        Ok(())
    }

    fn check_can_be_freed(&self, address: i64) -> HeapResult<()> {
        for allocation in &self.allocated {
            if allocation.range.address == address {
                return Ok(());
            } else if allocation.range.is_address_contained(address) {
                return Err(HeapError::FreeNotAtBlockStart);
            }
        }
        for range in &self.freed {
            if range.address == address {
                return Err(HeapError::DoubleFree);
            }
        }
        Err(HeapError::FreeOfUnallocatedMemory)
    }

    fn find_allocation(&self, range: MemoryRange) -> HeapResult<usize> {
        for (index, allocation) in self.allocated.iter().enumerate() {
            if allocation.range.contains(range) {
                return Ok(index);
            } else if allocation.range.overlaps(range) {
                return Err(HeapError::PartialOverlap);
            }
        }
        for freed in &self.freed {
            if range.overlaps(*freed) {
                return Err(HeapError::AccessToFreedMemory);
            }
        }
        Err(HeapError::DoesNotExist)
    }

    /// Loads `size` bytes at `address` as little-endian bits, checking
    /// containment and initialization when sanitizing; unchecked and
    /// backed by the flat byte space otherwise.
    pub fn load(&self, address: i64, size: i64) -> HeapResult<u64> {
        if !self.sanitize {
            let mut bytes = [0u8; 8];
            for (i, byte) in bytes.iter_mut().enumerate().take(size as usize) {
                *byte = self.flat_memory.get(&(address + i as i64)).copied().unwrap_or(0);
            }
            return Ok(u64::from_le_bytes(bytes));
        }
        let range = MemoryRange { address, size };
        let index = self.find_allocation(range).map_err(|err| {
            log::warn!("heap sanitizer: load(0x{address:x}, {size}) rejected: {err}");
            err
        })?;
        let allocation = &self.allocated[index];
        let start = (address - allocation.range.address) as usize;
        for i in start..start + size as usize {
            if !allocation.initialized[i] {
                log::warn!("heap sanitizer: load(0x{address:x}, {size}) rejected: uninitialized read");
                return Err(HeapError::UninitializedRead);
            }
        }
        let mut bytes = [0u8; 8];
        bytes[..size as usize].copy_from_slice(&allocation.bytes[start..start + size as usize]);
        Ok(u64::from_le_bytes(bytes))
    }

    /// Stores the low `size` bytes of `value` at `address`, marking them
    /// initialized when sanitizing; unchecked and backed by the flat byte
    /// space otherwise.
    pub fn store(&mut self, address: i64, size: i64, value: u64) -> HeapResult<()> {
        if !self.sanitize {
            let bytes = value.to_le_bytes();
            for (i, byte) in bytes.iter().enumerate().take(size as usize) {
                self.flat_memory.insert(address + i as i64, *byte);
            }
            return Ok(());
        }
        let range = MemoryRange { address, size };
        let index = self.find_allocation(range)?;
        let allocation = &mut self.allocated[index];
        let start = (address - allocation.range.address) as usize;
        let bytes = value.to_le_bytes();
        for i in 0..size as usize {
            allocation.bytes[start + i] = bytes[i];
            allocation.initialized[start + i] = true;
        }
        Ok(())
    }

    /// Called when the interpreted program terminates; a sanitizing heap
    /// with outstanding allocations is itself a diagnosable failure
    /// (spec.md §4.7: "on destruction, a non-empty allocated set fails").
    pub fn check_all_freed(&self) -> HeapResult<()> {
        if self.sanitize && !self.allocated.is_empty() {
            return Err(HeapError::LeakedMemory);
        }
        Ok(())
    }

    /// A multi-line hex dump of allocated and freed ranges for the
    /// debugger, mirroring the original's `ToDebuggerString` (spec.md
    /// §4.8's accessors return "snapshots" for display).
    pub fn to_debugger_string(&self) -> String {
        let mut out = String::new();
        if self.allocated.is_empty() {
            out.push_str("No allocated heap memory\n");
        } else {
            out.push_str("Allocated heap memory:\n");
            for allocation in &self.allocated {
                out.push_str(&format!(
                    "0x{:016x} - 0x{:016x} ({} bytes)\n",
                    allocation.range.address,
                    allocation.range.end() - 1,
                    allocation.range.size
                ));
            }
        }
        if self.freed.is_empty() {
            out.push_str("No freed heap memory\n");
        } else {
            out.push_str("Freed heap memory:\n");
            for range in &self.freed {
                out.push_str(&format!(
                    "0x{:016x} - 0x{:016x} ({} bytes)\n",
                    range.address,
                    range.end() - 1,
                    range.size
                ));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malloc_store_load_free_round_trips() {
        let mut heap = Heap::new(true);
        let addr = heap.malloc(8).unwrap();
        heap.store(addr, 8, 42).unwrap();
        assert_eq!(heap.load(addr, 8).unwrap(), 42);
        heap.free(addr).unwrap();
    }

    #[test]
    fn double_free_fails() {
        let mut heap = Heap::new(true);
        let addr = heap.malloc(8).unwrap();
        heap.free(addr).unwrap();
        assert_eq!(heap.free(addr), Err(HeapError::DoubleFree));
    }

    #[test]
    fn uninitialized_read_fails() {
        let mut heap = Heap::new(true);
        let addr = heap.malloc(8).unwrap();
        heap.store(addr, 1, 1).unwrap();
        assert_eq!(heap.load(addr, 8), Err(HeapError::UninitializedRead));
    }

    #[test]
    fn free_of_mid_allocation_address_fails() {
        let mut heap = Heap::new(true);
        let addr = heap.malloc(8).unwrap();
        assert_eq!(heap.free(addr + 4), Err(HeapError::FreeNotAtBlockStart));
    }

    #[test]
    fn partial_overlap_with_allocation_fails() {
        let mut heap = Heap::new(true);
        let addr = heap.malloc(4).unwrap();
        assert_eq!(heap.load(addr, 8), Err(HeapError::PartialOverlap));
    }

    #[test]
    fn non_sanitizing_heap_never_checks_but_still_stores() {
        let mut heap = Heap::new(false);
        let addr = heap.malloc(-1).unwrap();
        heap.store(addr, 8, 7).unwrap();
        assert_eq!(heap.load(addr, 8).unwrap(), 7);
    }

    #[test]
    fn leaked_memory_is_reported_at_teardown() {
        let mut heap = Heap::new(true);
        heap.malloc(8).unwrap();
        assert_eq!(heap.check_all_freed(), Err(HeapError::LeakedMemory));
    }

    #[test]
    fn repeated_free_reports_already_freed() {
        let mut heap = Heap::new(true);
        let addr = heap.malloc(8).unwrap();
        heap.store(addr, 8, 42).unwrap();
        heap.load(addr, 8).unwrap();
        heap.free(addr).unwrap();
        let err = heap.free(addr).unwrap_err();
        assert_eq!(err.to_string(), "memory was already freed");
    }
}
