//! # vmalloc - A Size-Class Memory Allocator over Anonymous Mappings
//!
//! This crate provides a user-space allocator that takes all of its memory
//! straight from the OS with `mmap(2)`, without going through the system
//! allocator.
//!
//! ## Overview
//!
//! Requests up to [`THRESHOLD`] (1 MiB) are rounded up to a power-of-two
//! **size class** and served from **arenas**: one mapping per arena, sliced into
//! equal slots and tracked with a bitmap. Bigger requests get a mapping of their
//! own with a small header in front.
//!
//! ```text
//!   allocate(size)
//!        │
//!        ├── size == 0 ─────────────► null
//!        │
//!        ├── size <= THRESHOLD ─────► classify ─► chains[index] ─► first free slot
//!        │                                          │
//!        │                                          └─ all full? grow the chain
//!        │
//!        └── size > THRESHOLD ──────► mmap(size + header) ─► header ─► payload
//! ```
//!
//! A single arena:
//!
//! ```text
//!   ┌──────────────┬─────┬────────┬────────┬────────┬─────┬────────┐
//!   │ Arena header │ pad │ slot 0 │ slot 1 │ slot 2 │ ... │ slot N │
//!   │ class        │     │  used  │  free  │  used  │     │  free  │
//!   │ bitmap 1 0 1 │     │        │        │        │     │        │
//!   │ next ────────┼──►  │        │        │        │     │        │
//!   └──────────────┴─────┴────────┴────────┴────────┴─────┴────────┘
//!                        ▲
//!                        └── data_base, slot i at data_base + i * class
//! ```
//!
//! Freeing scans the arena chains for one whose data region holds the address;
//! a miss means the pointer is a large allocation, whose header says how much to
//! unmap. [`Allocator::deallocate_sized`] skips the scan across classes.
//!
//! ## Crate Structure
//!
//! ```text
//!   vmalloc
//!   ├── align      - Alignment macro (align_to!) and log2
//!   ├── allocator  - Allocator: chain table, small path, free path
//!   ├── arena      - Arena header, slot hand-out and release (internal)
//!   ├── bitmap     - SlotBitmap (internal)
//!   ├── config     - Thresholds and per-class arena geometry
//!   ├── error      - AllocError
//!   ├── global     - Per-thread allocate / deallocate / deallocate_sized
//!   ├── large      - Direct mappings above the threshold (internal)
//!   ├── os         - VirtualMemory trait and the Mmap source
//!   └── size_class - SizeClass classifier
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use vmalloc::Allocator;
//!
//! let mut allocator = Allocator::new();
//!
//! unsafe {
//!     let ptr = allocator.allocate(std::mem::size_of::<u64>()) as *mut u64;
//!     *ptr = 42;
//!     assert_eq!(*ptr, 42);
//!
//!     allocator.deallocate(ptr as *mut u8);
//!
//!     // First fit: the freed slot comes straight back.
//!     assert_eq!(allocator.allocate(8), ptr as *mut u8);
//! }
//! ```
//!
//! ## Limitations
//!
//! - **Single-threaded only**: an [`Allocator`] is neither `Send` nor `Sync`;
//!   the free functions in this crate use one instance per thread
//! - **No return to the OS for small objects**: arenas stay mapped until the
//!   allocator is dropped, even when empty
//! - **Alignment**: slots are aligned to their class, capped at the page size
//! - **Unix-only**: requires `libc` and `mmap`
//!
//! ## Safety
//!
//! Freeing takes raw pointers and is `unsafe`. The allocator detects invalid,
//! double and misreported frees where it can do so without touching unmapped
//! memory, and panics on them from [`Allocator::deallocate`]; the `try_`
//! variants return the [`AllocError`] instead.

pub mod align;
mod allocator;
mod arena;
mod bitmap;
pub mod config;
mod error;
mod global;
mod large;
pub mod os;
mod size_class;

pub use allocator::{Allocator, AllocatorStats};
pub use config::THRESHOLD;
pub use error::AllocError;
pub use global::{allocate, deallocate, deallocate_sized, stats};
pub use large::HEADER_SIZE as LARGE_HEADER_SIZE;
pub use os::{Mmap, VirtualMemory};
pub use size_class::SizeClass;
