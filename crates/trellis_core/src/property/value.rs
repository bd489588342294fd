//! # Property Values
//!
//! The closed set of value kinds a property may hold. Geometry types are
//! `#[repr(C)]` plain-old-data so they can be hashed and compared by bit
//! pattern and handed to a graphics backend without conversion.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use bytemuck::{Pod, Zeroable};

/// Implements `PartialEq`, `Eq` and `Hash` over the raw bytes of a Pod type.
///
/// Floats compare by bit pattern: `NaN == NaN`, `0.0 != -0.0`.
macro_rules! bitwise_eq_hash {
    ($($ty:ty),* $(,)?) => {
        $(
            impl PartialEq for $ty {
                #[inline]
                fn eq(&self, other: &Self) -> bool {
                    bytemuck::bytes_of(self) == bytemuck::bytes_of(other)
                }
            }

            impl Eq for $ty {}

            impl Hash for $ty {
                #[inline]
                fn hash<H: Hasher>(&self, state: &mut H) {
                    bytemuck::bytes_of(self).hash(state);
                }
            }
        )*
    };
}

/// 2D vector.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct Vec2 {
    /// X component.
    pub x: f32,
    /// Y component.
    pub y: f32,
}

impl Vec2 {
    /// Creates a vector.
    #[inline]
    #[must_use]
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// 4D vector.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct Vec4 {
    /// X component.
    pub x: f32,
    /// Y component.
    pub y: f32,
    /// Z component.
    pub z: f32,
    /// W component.
    pub w: f32,
}

impl Vec4 {
    /// Creates a vector.
    #[inline]
    #[must_use]
    pub const fn new(x: f32, y: f32, z: f32, w: f32) -> Self {
        Self { x, y, z, w }
    }
}

/// Column-major 3x3 matrix.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct Mat3 {
    /// Columns.
    pub cols: [[f32; 3]; 3],
}

impl Mat3 {
    /// The identity matrix.
    pub const IDENTITY: Self = Self {
        cols: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
    };
}

impl Default for Mat3 {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Column-major 4x4 matrix.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct Mat4 {
    /// Columns.
    pub cols: [[f32; 4]; 4],
}

impl Mat4 {
    /// The identity matrix.
    pub const IDENTITY: Self = Self {
        cols: [
            [1.0, 0.0, 0.0, 0.0],
            [0.0, 1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ],
    };
}

impl Default for Mat4 {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Linear RGBA color.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct Color {
    /// Red.
    pub r: f32,
    /// Green.
    pub g: f32,
    /// Blue.
    pub b: f32,
    /// Alpha.
    pub a: f32,
}

impl Color {
    /// Opaque black.
    pub const BLACK: Self = Self::rgba(0.0, 0.0, 0.0, 1.0);
    /// Opaque white.
    pub const WHITE: Self = Self::rgba(1.0, 1.0, 1.0, 1.0);
    /// Fully transparent.
    pub const TRANSPARENT: Self = Self::rgba(0.0, 0.0, 0.0, 0.0);

    /// Creates a color from its components.
    #[inline]
    #[must_use]
    pub const fn rgba(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }
}

/// Axis-aligned rectangle, `min` inclusive and `max` exclusive.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct Aabr {
    /// Lower corner.
    pub min: Vec2,
    /// Upper corner.
    pub max: Vec2,
}

impl Aabr {
    /// Creates a rectangle from its corners.
    #[inline]
    #[must_use]
    pub const fn new(min: Vec2, max: Vec2) -> Self {
        Self { min, max }
    }

    /// Creates a rectangle at the origin with the given size.
    #[inline]
    #[must_use]
    pub const fn from_size(width: f32, height: f32) -> Self {
        Self {
            min: Vec2::new(0.0, 0.0),
            max: Vec2::new(width, height),
        }
    }

    /// Horizontal extent.
    #[inline]
    #[must_use]
    pub fn width(&self) -> f32 {
        self.max.x - self.min.x
    }

    /// Vertical extent.
    #[inline]
    #[must_use]
    pub fn height(&self) -> f32 {
        self.max.y - self.min.y
    }

    /// Returns true if the rectangle covers no area.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.width() <= 0.0 || self.height() <= 0.0
    }
}

bitwise_eq_hash!(Vec2, Vec4, Mat3, Mat4, Color, Aabr);

/// Immutable polygon outline. Clones share the vertex storage.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Polygon(Arc<[Vec2]>);

impl Polygon {
    /// Creates a polygon from its vertices.
    #[must_use]
    pub fn new(vertices: impl Into<Arc<[Vec2]>>) -> Self {
        Self(vertices.into())
    }

    /// The vertices in order.
    #[must_use]
    pub fn vertices(&self) -> &[Vec2] {
        &self.0
    }

    /// Number of vertices.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the polygon has no vertices.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Discriminant of a [`PropertyValue`]. A node's kind is fixed at creation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ValueKind {
    /// `bool`
    Bool,
    /// `i64`
    Int,
    /// `f64`
    Float,
    /// Shared string
    String,
    /// [`Vec2`]
    Vec2,
    /// [`Vec4`]
    Vec4,
    /// [`Mat3`]
    Mat3,
    /// [`Mat4`]
    Mat4,
    /// [`Color`]
    Color,
    /// [`Aabr`]
    Aabr,
    /// [`Polygon`]
    Polygon,
}

impl ValueKind {
    /// Lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Float => "float",
            Self::String => "string",
            Self::Vec2 => "vec2",
            Self::Vec4 => "vec4",
            Self::Mat3 => "mat3",
            Self::Mat4 => "mat4",
            Self::Color => "color",
            Self::Aabr => "aabr",
            Self::Polygon => "polygon",
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A property value.
#[derive(Clone, Debug)]
pub enum PropertyValue {
    /// Boolean.
    Bool(bool),
    /// Signed integer.
    Int(i64),
    /// Double precision float.
    Float(f64),
    /// Shared immutable string.
    String(Arc<str>),
    /// 2D vector.
    Vec2(Vec2),
    /// 4D vector.
    Vec4(Vec4),
    /// 3x3 matrix.
    Mat3(Mat3),
    /// 4x4 matrix.
    Mat4(Mat4),
    /// Color.
    Color(Color),
    /// Axis-aligned rectangle.
    Aabr(Aabr),
    /// Polygon outline.
    Polygon(Polygon),
}

impl PropertyValue {
    /// The kind of this value.
    #[must_use]
    pub const fn kind(&self) -> ValueKind {
        match self {
            Self::Bool(_) => ValueKind::Bool,
            Self::Int(_) => ValueKind::Int,
            Self::Float(_) => ValueKind::Float,
            Self::String(_) => ValueKind::String,
            Self::Vec2(_) => ValueKind::Vec2,
            Self::Vec4(_) => ValueKind::Vec4,
            Self::Mat3(_) => ValueKind::Mat3,
            Self::Mat4(_) => ValueKind::Mat4,
            Self::Color(_) => ValueKind::Color,
            Self::Aabr(_) => ValueKind::Aabr,
            Self::Polygon(_) => ValueKind::Polygon,
        }
    }

    /// Returns the boolean, if this is one.
    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the integer, if this is one.
    #[must_use]
    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the float, if this is one.
    #[must_use]
    pub const fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the string, if this is one.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(v) => Some(v),
            _ => None,
        }
    }

    /// Returns the 2D vector, if this is one.
    #[must_use]
    pub const fn as_vec2(&self) -> Option<Vec2> {
        match self {
            Self::Vec2(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the 4D vector, if this is one.
    #[must_use]
    pub const fn as_vec4(&self) -> Option<Vec4> {
        match self {
            Self::Vec4(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the 3x3 matrix, if this is one.
    #[must_use]
    pub const fn as_mat3(&self) -> Option<Mat3> {
        match self {
            Self::Mat3(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the 4x4 matrix, if this is one.
    #[must_use]
    pub const fn as_mat4(&self) -> Option<Mat4> {
        match self {
            Self::Mat4(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the color, if this is one.
    #[must_use]
    pub const fn as_color(&self) -> Option<Color> {
        match self {
            Self::Color(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the rectangle, if this is one.
    #[must_use]
    pub const fn as_aabr(&self) -> Option<Aabr> {
        match self {
            Self::Aabr(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the polygon, if this is one.
    #[must_use]
    pub const fn as_polygon(&self) -> Option<&Polygon> {
        match self {
            Self::Polygon(v) => Some(v),
            _ => None,
        }
    }
}

impl PartialEq for PropertyValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a.to_bits() == b.to_bits(),
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Vec2(a), Self::Vec2(b)) => a == b,
            (Self::Vec4(a), Self::Vec4(b)) => a == b,
            (Self::Mat3(a), Self::Mat3(b)) => a == b,
            (Self::Mat4(a), Self::Mat4(b)) => a == b,
            (Self::Color(a), Self::Color(b)) => a == b,
            (Self::Aabr(a), Self::Aabr(b)) => a == b,
            (Self::Polygon(a), Self::Polygon(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for PropertyValue {}

impl Hash for PropertyValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.kind().hash(state);
        match self {
            Self::Bool(v) => v.hash(state),
            Self::Int(v) => v.hash(state),
            Self::Float(v) => v.to_bits().hash(state),
            Self::String(v) => v.hash(state),
            Self::Vec2(v) => v.hash(state),
            Self::Vec4(v) => v.hash(state),
            Self::Mat3(v) => v.hash(state),
            Self::Mat4(v) => v.hash(state),
            Self::Color(v) => v.hash(state),
            Self::Aabr(v) => v.hash(state),
            Self::Polygon(v) => v.hash(state),
        }
    }
}

macro_rules! value_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for PropertyValue {
                #[inline]
                fn from(value: $ty) -> Self {
                    Self::$variant(value)
                }
            }
        )*
    };
}

value_from!(
    bool => Bool,
    i64 => Int,
    f64 => Float,
    Arc<str> => String,
    Vec2 => Vec2,
    Vec4 => Vec4,
    Mat3 => Mat3,
    Mat4 => Mat4,
    Color => Color,
    Aabr => Aabr,
    Polygon => Polygon,
);

impl From<i32> for PropertyValue {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<f32> for PropertyValue {
    fn from(value: f32) -> Self {
        Self::Float(f64::from(value))
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        Self::String(Arc::from(value))
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        Self::String(Arc::from(value))
    }
}
