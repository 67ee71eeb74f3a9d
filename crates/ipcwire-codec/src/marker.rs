/// Type tag written as a 4-byte native-order integer before every value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Marker {
    False = 0,
    True = 1,
    None = 2,
    Int64 = 3,
    Double = 4,
    String = 5,
    Bytes = 6,
    ArrayStart = 7,
    ArrayEnd = 8,
    DictStart = 9,
    DictEnd = 10,
    Fd = 11,
}

impl Marker {
    /// Look up a marker by its wire value.
    pub fn from_u32(raw: u32) -> Option<Self> {
        Some(match raw {
            0 => Self::False,
            1 => Self::True,
            2 => Self::None,
            3 => Self::Int64,
            4 => Self::Double,
            5 => Self::String,
            6 => Self::Bytes,
            7 => Self::ArrayStart,
            8 => Self::ArrayEnd,
            9 => Self::DictStart,
            10 => Self::DictEnd,
            11 => Self::Fd,
            _ => return None,
        })
    }

    /// Wire value of this marker.
    pub fn as_u32(self) -> u32 {
        self as u32
    }

    /// Protocol name, used in diagnostics.
    pub fn name(self) -> &'static str {
        match self {
            Self::False => "FALSE",
            Self::True => "TRUE",
            Self::None => "NONE",
            Self::Int64 => "INT64",
            Self::Double => "DOUBLE",
            Self::String => "STRING",
            Self::Bytes => "BYTES",
            Self::ArrayStart => "ARRAY_START",
            Self::ArrayEnd => "ARRAY_END",
            Self::DictStart => "DICT_START",
            Self::DictEnd => "DICT_END",
            Self::Fd => "FD",
        }
    }
}

impl std::fmt::Display for Marker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
