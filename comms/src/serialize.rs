/// Types that can be written into an outgoing frame.
pub trait Serialize {
    /// Appends the wire representation of `self` into `buf`.
    fn serialize(&self, buf: &mut Vec<u8>);
}
