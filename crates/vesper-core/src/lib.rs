//! Core runtime of the Vesper interpreter: the tagged value
//! representation, the eq/eqv/equal algebra and its hashers, the
//! chained-bucket hash table, and the managed-object pool that breaks
//! reference cycles so refcounting can reclaim them.

pub mod equiv;
pub mod error;
pub mod number;
pub mod pool;
pub mod table;
pub mod value;
pub mod write;

pub use equiv::{
    eq, equal, equal_with_probe, eqv, hash_eq, hash_equal, hash_equal_with_probe, hash_eqv,
    AbortProbe,
};
pub use error::CoreError;
pub use number::{normalized, num_cmp, num_eq, Rational};
pub use pool::{ManagedCell, ManagedObjectPool, ObjHeader, PoolStats};
pub use table::{CustomProcs, Equiv, HashTable, ValueCell, DEFAULT_CAPACITY};
pub use value::{
    intern, resolve, with_resolved, ArrayObj, MutBox, MutPair, OpaqueKind, OpaqueObj, RecordObj,
    SourcePos, SyntaxObj, Type, Value, VectorObj,
};
pub use write::{display_value, display_with_probe, write_value, write_with_probe};
