bitflags::bitflags! {
    /// Message type carried in the transport header's flags word.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MessageFlags: u32 {
        const REQUEST = 1;
        const RESPONSE = 2;
        const NOTIFICATION = 4;
    }
}

impl MessageFlags {
    /// No type bit set. Never valid on the wire.
    pub const NONE: Self = Self::empty();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_values() {
        assert_eq!(MessageFlags::NONE.bits(), 0);
        assert_eq!(MessageFlags::REQUEST.bits(), 1);
        assert_eq!(MessageFlags::RESPONSE.bits(), 2);
        assert_eq!(MessageFlags::NOTIFICATION.bits(), 4);
    }

    #[test]
    fn unknown_bits_are_retained() {
        let flags = MessageFlags::from_bits_retain(0x10 | 1);
        assert!(flags.contains(MessageFlags::REQUEST));
        assert_eq!(flags.bits(), 0x11);
    }
}
