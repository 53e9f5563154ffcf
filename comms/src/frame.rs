use std::io;

/// Every frame starts with its body length as a big-endian `u64`.
pub(crate) const HEADER_LEN: usize = size_of::<u64>();

/// Bodies larger than this are refused on both ends.
pub(crate) const MAX_FRAME_LEN: usize = 1 << 30;

pub(crate) fn check_len(len: usize) -> io::Result<()> {
    if len > MAX_FRAME_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Frame of {len} bytes exceeds the {MAX_FRAME_LEN} bytes limit"),
        ));
    }

    Ok(())
}

pub(crate) fn encode_header(len: usize) -> [u8; HEADER_LEN] {
    (len as u64).to_be_bytes()
}

pub(crate) fn decode_header(header: [u8; HEADER_LEN]) -> io::Result<usize> {
    let len = usize::try_from(u64::from_be_bytes(header))
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    check_len(len)?;
    Ok(len)
}
