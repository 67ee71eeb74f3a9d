use ipcwire_transport::Fd;

/// A dynamically typed value carried by the codec.
///
/// `Dict` keeps insertion order and accepts any value as a key. A `Value` may
/// own file descriptors, so it is move-only. Equality compares doubles by
/// their bits (so `NaN == NaN` and `0.0 != -0.0`) and descriptors by number.
///
/// Dropping a value never recurses, so arbitrarily deep nesting is safe to
/// release. Containers are taken apart through [`Value::into_array`] and
/// friends rather than by destructuring.
#[derive(Debug)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Double(f64),
    String(String),
    Bytes(Vec<u8>),
    Array(Vec<Value>),
    Dict(Vec<(Value, Value)>),
    Fd(Fd),
}

impl Value {
    /// Build a dict from key/value pairs, keeping their order.
    pub fn dict<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<Value>,
        V: Into<Value>,
    {
        Self::Dict(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Short type name, used in diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Double(_) => "double",
            Self::String(_) => "string",
            Self::Bytes(_) => "bytes",
            Self::Array(_) => "array",
            Self::Dict(_) => "dict",
            Self::Fd(_) => "fd",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_double(&self) -> Option<f64> {
        match self {
            Self::Double(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Self::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_dict(&self) -> Option<&[(Value, Value)]> {
        match self {
            Self::Dict(pairs) => Some(pairs),
            _ => None,
        }
    }

    pub fn as_fd(&self) -> Option<&Fd> {
        match self {
            Self::Fd(fd) => Some(fd),
            _ => None,
        }
    }

    /// Look up a string key in a dict. Returns the first match.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_dict()?
            .iter()
            .find(|(k, _)| k.as_str() == Some(key))
            .map(|(_, v)| v)
    }

    /// Take the elements out of an array, or give the value back.
    pub fn into_array(mut self) -> Result<Vec<Value>, Value> {
        if let Self::Array(items) = &mut self {
            return Ok(std::mem::take(items));
        }
        Err(self)
    }

    /// Take the pairs out of a dict, or give the value back.
    pub fn into_dict(mut self) -> Result<Vec<(Value, Value)>, Value> {
        if let Self::Dict(pairs) = &mut self {
            return Ok(std::mem::take(pairs));
        }
        Err(self)
    }

    /// Take the text out of a string, or give the value back.
    pub fn into_string(mut self) -> Result<String, Value> {
        if let Self::String(s) = &mut self {
            return Ok(std::mem::take(s));
        }
        Err(self)
    }

    /// Take the descriptor out of an fd value, or give the value back.
    pub fn into_fd(mut self) -> Result<Fd, Value> {
        if let Self::Fd(fd) = &mut self {
            return Ok(fd.transfer());
        }
        Err(self)
    }
}

impl Drop for Value {
    fn drop(&mut self) {
        let mut stack = match self {
            Self::Array(items) if !items.is_empty() => std::mem::take(items),
            Self::Dict(pairs) if !pairs.is_empty() => {
                std::mem::take(pairs).into_iter().flat_map(|(k, v)| [k, v]).collect()
            }
            _ => return,
        };
        // Children are emptied before they drop, so each drop is shallow.
        while let Some(mut value) = stack.pop() {
            match &mut value {
                Self::Array(items) => stack.append(items),
                Self::Dict(pairs) => stack.extend(pairs.drain(..).flat_map(|(k, v)| [k, v])),
                _ => {}
            }
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Double(a), Self::Double(b)) => a.to_bits() == b.to_bits(),
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Bytes(a), Self::Bytes(b)) => a == b,
            (Self::Array(a), Self::Array(b)) => a == b,
            (Self::Dict(a), Self::Dict(b)) => a == b,
            (Self::Fd(a), Self::Fd(b)) => a == b,
            _ => false,
        }
    }
}

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Self::Null
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Self::Int(i64::from(i))
    }
}

impl From<u32> for Value {
    fn from(i: u32) -> Self {
        Self::Int(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(d: f64) -> Self {
        Self::Double(d)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Self::Bytes(b)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Self::Array(items)
    }
}

impl From<Vec<(Value, Value)>> for Value {
    fn from(pairs: Vec<(Value, Value)>) -> Self {
        Self::Dict(pairs)
    }
}

impl From<Fd> for Value {
    fn from(fd: Fd) -> Self {
        Self::Fd(fd)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        opt.map_or(Self::Null, Into::into)
    }
}
