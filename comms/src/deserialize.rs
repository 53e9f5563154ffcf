use std::io;

/// Types that can be rebuilt from the body of an incoming frame.
pub trait Deserialize: Sized {
    /// Parses `buf`, which holds exactly one frame body.
    fn deserialize(buf: &[u8]) -> io::Result<Self>;
}
