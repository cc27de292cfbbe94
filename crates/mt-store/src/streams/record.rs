//! The record shape the streams cache operates over. Kept physical: the
//! cache and the underlying client never rewrite attribute names, they
//! only reason about sequence numbers and the raw key/image attributes
//! (§4.I works purely in terms of `(position, records, nextIterator)`).

use crate::value::Item;
use num_bigint::BigUint;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEventType {
    Insert,
    Modify,
    Remove,
}

#[derive(Debug, Clone)]
pub struct StreamRecord {
    pub sequence_number: BigUint,
    /// The physical key attributes of the item the record describes.
    pub keys: Item,
    pub event_type: StreamEventType,
    pub new_image: Option<Item>,
    pub old_image: Option<Item>,
}
