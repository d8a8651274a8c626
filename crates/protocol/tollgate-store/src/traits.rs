//! Storage trait definitions.
//!
//! All storage components are defined as traits so tests can swap in
//! alternative implementations. The default implementations use
//! SQLite over a shared connection.

use tollgate_types::{
    AddressScheme, Network, Payment, PaymentMethod, Request, Timestamp, Visitor,
};

use crate::error::Result;

/// Produces a deposit address for a derivation index.
///
/// Passed into the allocator's transaction so key derivation stays
/// outside the storage crate. Errors are opaque strings; the store
/// wraps them in [`crate::StoreError::Derivation`].
pub type DeriveAddress<'a> = &'a dyn Fn(u32) -> std::result::Result<String, String>;

/// Everything needed to create a fresh payment demand.
#[derive(Debug, Clone)]
pub struct NewPayment {
    pub visitor_id: i64,
    pub method: PaymentMethod,
    pub network: Network,
    pub address_scheme: AddressScheme,
    pub xpub: String,
    /// Base units, must be positive.
    pub amount_owed: i64,
    /// Deadline, `None` for no expiry.
    pub expires: Option<Timestamp>,
    /// First index to try when no prior derivation exists.
    pub derive_index_start: u32,
}

/// Visitor persistence.
pub trait VisitorStore {
    /// Insert a new visitor, returning it with its row id.
    ///
    /// A concurrent insert for the same IP surfaces as a unique
    /// violation; callers recover by re-reading.
    fn insert(&self, visitor: &Visitor) -> Result<Visitor>;

    /// Rewrite a persisted visitor's mutable fields.
    fn update(&self, visitor: &Visitor) -> Result<()>;

    /// Look up a visitor by IP.
    fn get_by_ip(&self, ip: &str) -> Result<Option<Visitor>>;

    /// Look up a visitor by row id.
    fn get_by_id(&self, id: i64) -> Result<Option<Visitor>>;

    /// Delete status-less visitors created before `cutoff`, cascading
    /// to their requests. Returns the number of visitors removed.
    fn delete_unknown_older_than(&self, cutoff: Timestamp) -> Result<usize>;
}

/// Request persistence.
pub trait RequestStore {
    /// Append a request, returning it with its row id.
    fn append(&self, request: &Request) -> Result<Request>;

    /// The newest requests for a visitor, newest first.
    fn newest(&self, visitor_id: i64, limit: u32) -> Result<Vec<Request>>;

    /// The earliest request held for a visitor.
    fn earliest(&self, visitor_id: i64) -> Result<Option<Request>>;

    /// Total requests held for a visitor.
    fn count(&self, visitor_id: i64) -> Result<u64>;
}

/// Payment persistence, including the transactional allocator ops.
pub trait PaymentStore {
    /// Look up a payment by row id.
    fn get_by_id(&self, id: i64) -> Result<Option<Payment>>;

    /// Rewrite a persisted payment's mutable fields, stamping nothing;
    /// callers set `updated` themselves.
    fn update(&self, payment: &Payment) -> Result<()>;

    /// The most recently created PENDING payment for the visitor on
    /// this method and network.
    fn find_pending(
        &self,
        visitor_id: i64,
        method: PaymentMethod,
        network: Network,
    ) -> Result<Option<Payment>>;

    /// Find-or-create a PENDING payment inside one transaction.
    ///
    /// Resolution order: an existing PENDING row wins; otherwise, when
    /// `reuse_expired` is set, the oldest EXPIRED row for the method
    /// and network is repurposed in place (address, derivation
    /// coordinates and `created` kept); otherwise a fresh address is
    /// derived at the highest used index plus one. An address
    /// uniqueness collision on insert advances the index and retries,
    /// at most `max_attempts` times.
    fn get_or_create_pending(
        &self,
        spec: &NewPayment,
        reuse_expired: bool,
        max_attempts: u32,
        derive: DeriveAddress,
        now: Timestamp,
    ) -> Result<Payment>;

    /// Persist a settled payment together with its visitor's new
    /// status, atomically. Neither row changes if either write fails.
    fn save_settlement(&self, payment: &Payment, visitor: &Visitor) -> Result<()>;

    /// Flip PENDING payments whose deadline has passed to EXPIRED.
    /// Returns the number of rows changed.
    fn expire_pending(&self, now: Timestamp) -> Result<usize>;

    /// Highest payment row id, if any rows exist.
    fn max_id(&self) -> Result<Option<i64>>;

    /// Count PENDING rows with id at or below `max_id`.
    fn count_pending_through(
        &self,
        max_id: i64,
        method: PaymentMethod,
        network: Network,
    ) -> Result<u64>;

    /// A page of PENDING rows with id at or below `max_id`, id
    /// descending, starting strictly below `before_id` when given.
    fn pending_batch(
        &self,
        max_id: i64,
        method: PaymentMethod,
        network: Network,
        before_id: Option<i64>,
        limit: u32,
    ) -> Result<Vec<Payment>>;
}

/// Key/value metadata persistence, including the lock primitive.
pub trait MetaStore {
    /// Read a value.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write a value (or NULL).
    fn set(&self, key: &str, value: Option<&str>) -> Result<()>;

    /// Atomic read-transform-write.
    ///
    /// `transform` sees the current value and returns `Some(new)` to
    /// write (where `new` may be `None` for NULL) or `None` to leave
    /// the row untouched. Runs read and write in one transaction;
    /// returns the value in force afterwards.
    fn get_and_set(
        &self,
        key: &str,
        transform: &mut dyn FnMut(Option<&str>) -> Option<Option<String>>,
    ) -> Result<Option<String>>;
}
