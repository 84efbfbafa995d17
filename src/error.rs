/// Errors produced while decoding frames received from the BMS.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The buffer is shorter than the decoder requires.
    #[error("frame too short - required={required} received={received}")]
    FrameTooShort { required: usize, received: usize },
    /// The frame type discriminator is not one of the known values.
    #[error("unknown frame type 0x{0:02X}")]
    UnknownFrameType(u8),
    /// The trailing checksum byte does not match the frame contents.
    #[error("invalid checksum - calculated=0x{calculated:02X} received=0x{received:02X}")]
    CheckSum { calculated: u8, received: u8 },
}
