use std::fmt;
use uuid::Uuid;
use viaduct_types::{BlockPos, ItemStack, Metadata};

/// A decoded wire value, as held by a packet context.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Nothing,
    Bool(bool),
    Byte(i8),
    UByte(u8),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
    Uuid(Uuid),
    Position(BlockPos),
    Item(Option<ItemStack>),
    IntArray(Vec<i32>),
    StringArray(Vec<String>),
    Bytes(Vec<u8>),
    Metadata(Vec<Metadata>),
}

/// The runtime shape of a [`Value`]. Several codecs may share one shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Shape {
    Nothing,
    Bool,
    Byte,
    UByte,
    Short,
    Int,
    Long,
    Float,
    Double,
    String,
    Uuid,
    Position,
    Item,
    IntArray,
    StringArray,
    Bytes,
    Metadata,
}

impl Shape {
    pub fn name(self) -> &'static str {
        match self {
            Shape::Nothing => "Nothing",
            Shape::Bool => "Bool",
            Shape::Byte => "Byte",
            Shape::UByte => "UByte",
            Shape::Short => "Short",
            Shape::Int => "Int",
            Shape::Long => "Long",
            Shape::Float => "Float",
            Shape::Double => "Double",
            Shape::String => "String",
            Shape::Uuid => "Uuid",
            Shape::Position => "Position",
            Shape::Item => "Item",
            Shape::IntArray => "IntArray",
            Shape::StringArray => "StringArray",
            Shape::Bytes => "Bytes",
            Shape::Metadata => "Metadata",
        }
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Value {
    pub fn shape(&self) -> Shape {
        match self {
            Value::Nothing => Shape::Nothing,
            Value::Bool(_) => Shape::Bool,
            Value::Byte(_) => Shape::Byte,
            Value::UByte(_) => Shape::UByte,
            Value::Short(_) => Shape::Short,
            Value::Int(_) => Shape::Int,
            Value::Long(_) => Shape::Long,
            Value::Float(_) => Shape::Float,
            Value::Double(_) => Shape::Double,
            Value::String(_) => Shape::String,
            Value::Uuid(_) => Shape::Uuid,
            Value::Position(_) => Shape::Position,
            Value::Item(_) => Shape::Item,
            Value::IntArray(_) => Shape::IntArray,
            Value::StringArray(_) => Shape::StringArray,
            Value::Bytes(_) => Shape::Bytes,
            Value::Metadata(_) => Shape::Metadata,
        }
    }

    /// Widen any integral value. Booleans count as 0/1.
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Value::Bool(b) => Some(b as i64),
            Value::Byte(v) => Some(v as i64),
            Value::UByte(v) => Some(v as i64),
            Value::Short(v) => Some(v as i64),
            Value::Int(v) => Some(v as i64),
            Value::Long(v) => Some(v),
            _ => None,
        }
    }

    /// Widen any numeric value to a double.
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Value::Float(v) => Some(v as f64),
            Value::Double(v) => Some(v),
            _ => self.as_i64().map(|v| v as f64),
        }
    }
}

/// A Rust type that is carried inside exactly one [`Value`] variant.
pub trait WireValue: Clone + Sized + Send + Sync + 'static {
    const SHAPE: Shape;

    fn into_value(self) -> Value;

    /// Unwrap a value of the matching shape, or hand the value back.
    fn from_value(value: Value) -> Result<Self, Value>;

    fn from_ref(value: &Value) -> Option<&Self>;

    fn from_mut(value: &mut Value) -> Option<&mut Self>;
}

macro_rules! wire_value {
    ($ty:ty, $variant:ident) => {
        impl WireValue for $ty {
            const SHAPE: Shape = Shape::$variant;

            fn into_value(self) -> Value {
                Value::$variant(self)
            }

            fn from_value(value: Value) -> Result<Self, Value> {
                match value {
                    Value::$variant(v) => Ok(v),
                    other => Err(other),
                }
            }

            fn from_ref(value: &Value) -> Option<&Self> {
                match value {
                    Value::$variant(v) => Some(v),
                    _ => None,
                }
            }

            fn from_mut(value: &mut Value) -> Option<&mut Self> {
                match value {
                    Value::$variant(v) => Some(v),
                    _ => None,
                }
            }
        }
    };
}

wire_value!(bool, Bool);
wire_value!(i8, Byte);
wire_value!(u8, UByte);
wire_value!(i16, Short);
wire_value!(i32, Int);
wire_value!(i64, Long);
wire_value!(f32, Float);
wire_value!(f64, Double);
wire_value!(String, String);
wire_value!(Uuid, Uuid);
wire_value!(BlockPos, Position);
wire_value!(Option<ItemStack>, Item);
wire_value!(Vec<i32>, IntArray);
wire_value!(Vec<String>, StringArray);
wire_value!(Vec<u8>, Bytes);
wire_value!(Vec<Metadata>, Metadata);

impl WireValue for () {
    const SHAPE: Shape = Shape::Nothing;

    fn into_value(self) -> Value {
        Value::Nothing
    }

    fn from_value(value: Value) -> Result<Self, Value> {
        match value {
            Value::Nothing => Ok(()),
            other => Err(other),
        }
    }

    fn from_ref(value: &Value) -> Option<&Self> {
        match value {
            Value::Nothing => Some(&()),
            _ => None,
        }
    }

    // There is nothing to mutate in place.
    fn from_mut(_value: &mut Value) -> Option<&mut Self> {
        None
    }
}
