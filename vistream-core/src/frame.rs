//! The unit of transport: one synchronized RGB / depth / point cloud /
//! pose capture.
//!
//! Field rules (checked by [`SensorFrame::validate`], the encoder and the
//! decoder alike):
//!
//! | Field        | dtype       | shape       |
//! |--------------|-------------|-------------|
//! | `rgb`        | u8          | (H, W, 3)   |
//! | `depth`      | u16         | (H, W)      |
//! | `pointcloud` | f32 or f64  | (N, 3)      |
//! | `transform`  | f32 or f64  | (4, 4)      |
//!
//! The transform is row-major. An identity transform means odometry has
//! not converged yet; it is carried like any other pose.

use std::fmt;

use glam::{DMat4, DQuat, DVec3};

use crate::array::{ArrayData, DType, NdArray};
use crate::error::StreamError;

// ── Field ────────────────────────────────────────────────────────

/// The four records of a frame, in wire order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Rgb,
    Depth,
    PointCloud,
    Transform,
}

impl Field {
    /// Wire order of the records.
    pub const ORDER: [Field; 4] = [Field::Rgb, Field::Depth, Field::PointCloud, Field::Transform];

    pub const fn name(self) -> &'static str {
        match self {
            Field::Rgb => "rgb",
            Field::Depth => "depth",
            Field::PointCloud => "pointcloud",
            Field::Transform => "transform",
        }
    }

    /// Check dtype and dimensionality of `array` for this field.
    ///
    /// Returns a human-readable reason on violation; callers wrap it in
    /// the error that fits their side of the wire.
    pub fn check(self, array: &NdArray) -> Result<(), String> {
        let dtype = array.dtype();
        let shape = array.shape();
        match self {
            Field::Rgb => {
                expect_dtype(dtype, &[DType::U8])?;
                expect_ndim(shape, 3)?;
                if shape[2] != 3 {
                    return Err(format!("expected 3 channels, got {}", shape[2]));
                }
            }
            Field::Depth => {
                expect_dtype(dtype, &[DType::U16])?;
                expect_ndim(shape, 2)?;
            }
            Field::PointCloud => {
                expect_dtype(dtype, &[DType::F32, DType::F64])?;
                expect_ndim(shape, 2)?;
                if shape[1] != 3 {
                    return Err(format!("expected (N, 3) points, got {shape:?}"));
                }
            }
            Field::Transform => {
                expect_dtype(dtype, &[DType::F32, DType::F64])?;
                if shape != [4, 4] {
                    return Err(format!("expected a 4x4 matrix, got {shape:?}"));
                }
            }
        }
        Ok(())
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn expect_dtype(actual: DType, allowed: &[DType]) -> Result<(), String> {
    if allowed.contains(&actual) {
        Ok(())
    } else {
        let names: Vec<String> = allowed.iter().map(|d| d.to_string()).collect();
        Err(format!("expected dtype {}, got {actual}", names.join(" or ")))
    }
}

fn expect_ndim(shape: &[usize], ndim: usize) -> Result<(), String> {
    if shape.len() == ndim {
        Ok(())
    } else {
        Err(format!("expected {ndim} dimensions, got {}", shape.len()))
    }
}

// ── SensorFrame ──────────────────────────────────────────────────

/// One synchronized capture.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorFrame {
    /// Color image, `(H, W, 3)` u8, interleaved.
    pub rgb: NdArray,
    /// Depth map in millimeters, `(H, W)` u16.
    pub depth: NdArray,
    /// Unordered points in the device frame, `(N, 3)` float.
    pub pointcloud: NdArray,
    /// Camera pose, `(4, 4)` float, row-major.
    pub transform: NdArray,
}

impl SensorFrame {
    /// Assemble a frame, rejecting anything that violates the field rules.
    pub fn new(
        rgb: NdArray,
        depth: NdArray,
        pointcloud: NdArray,
        transform: NdArray,
    ) -> Result<Self, StreamError> {
        let frame = Self {
            rgb,
            depth,
            pointcloud,
            transform,
        };
        frame.validate()?;
        Ok(frame)
    }

    pub fn builder() -> SensorFrameBuilder {
        SensorFrameBuilder::default()
    }

    /// Borrow the array stored for `field`.
    pub fn field(&self, field: Field) -> &NdArray {
        match field {
            Field::Rgb => &self.rgb,
            Field::Depth => &self.depth,
            Field::PointCloud => &self.pointcloud,
            Field::Transform => &self.transform,
        }
    }

    /// Check every field rule plus the rgb/depth resolution match.
    pub fn validate(&self) -> Result<(), StreamError> {
        for field in Field::ORDER {
            field
                .check(self.field(field))
                .map_err(|reason| StreamError::encoding(field.name(), reason))?;
        }
        self.check_resolution()
            .map_err(|reason| StreamError::encoding(Field::Depth.name(), reason))
    }

    /// `depth` must cover the same (H, W) grid as `rgb`.
    pub(crate) fn check_resolution(&self) -> Result<(), String> {
        let rgb = self.rgb.shape().get(..2).unwrap_or(&[]);
        let depth = self.depth.shape();
        if rgb != depth {
            return Err(format!(
                "depth resolution {depth:?} does not match rgb resolution {rgb:?}"
            ));
        }
        Ok(())
    }

    /// Image resolution as `(height, width)`.
    pub fn resolution(&self) -> (usize, usize) {
        let s = self.rgb.shape();
        (
            s.first().copied().unwrap_or(0),
            s.get(1).copied().unwrap_or(0),
        )
    }

    /// Number of points in the cloud.
    pub fn point_count(&self) -> usize {
        self.pointcloud.shape().first().copied().unwrap_or(0)
    }

    /// The transform as a `glam` matrix.
    pub fn pose(&self) -> DMat4 {
        let mut row_major = [0.0f64; 16];
        for (i, v) in row_major.iter_mut().enumerate() {
            *v = self.transform.get_f64(i).unwrap_or(0.0);
        }
        DMat4::from_cols_array(&row_major).transpose()
    }

    /// Whether the pose is exactly the identity, i.e. the odometry has not
    /// produced a valid pose yet. Purely informational.
    pub fn pose_is_identity(&self) -> bool {
        self.pose() == DMat4::IDENTITY
    }

    /// Shapes and dtypes of all four fields.
    pub fn layout(&self) -> FrameLayout {
        FrameLayout {
            rgb: ArrayLayout::of(&self.rgb),
            depth: ArrayLayout::of(&self.depth),
            pointcloud: ArrayLayout::of(&self.pointcloud),
            transform: ArrayLayout::of(&self.transform),
        }
    }

    /// Total raw content of all four arrays in bytes.
    pub fn byte_len(&self) -> usize {
        Field::ORDER.iter().map(|&f| self.field(f).byte_len()).sum()
    }
}

// ── SensorFrameBuilder ───────────────────────────────────────────

/// Incremental construction of a [`SensorFrame`]; `build` reports which
/// field is missing.
#[derive(Debug, Default, Clone)]
pub struct SensorFrameBuilder {
    rgb: Option<NdArray>,
    depth: Option<NdArray>,
    pointcloud: Option<NdArray>,
    transform: Option<NdArray>,
}

impl SensorFrameBuilder {
    pub fn rgb(mut self, rgb: NdArray) -> Self {
        self.rgb = Some(rgb);
        self
    }

    pub fn depth(mut self, depth: NdArray) -> Self {
        self.depth = Some(depth);
        self
    }

    pub fn pointcloud(mut self, pointcloud: NdArray) -> Self {
        self.pointcloud = Some(pointcloud);
        self
    }

    pub fn transform(mut self, transform: NdArray) -> Self {
        self.transform = Some(transform);
        self
    }

    pub fn build(self) -> Result<SensorFrame, StreamError> {
        let missing = |field: Field| StreamError::encoding(field.name(), "field is absent");
        SensorFrame::new(
            self.rgb.ok_or_else(|| missing(Field::Rgb))?,
            self.depth.ok_or_else(|| missing(Field::Depth))?,
            self.pointcloud.ok_or_else(|| missing(Field::PointCloud))?,
            self.transform.ok_or_else(|| missing(Field::Transform))?,
        )
    }
}

// ── Layout ───────────────────────────────────────────────────────

/// Dtype and shape of one array.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArrayLayout {
    pub dtype: DType,
    pub shape: Vec<usize>,
}

impl ArrayLayout {
    fn of(array: &NdArray) -> Self {
        Self {
            dtype: array.dtype(),
            shape: array.shape().to_vec(),
        }
    }
}

impl fmt::Display for ArrayLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{:?}", self.dtype, self.shape)
    }
}

/// Dtypes and shapes of a whole frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameLayout {
    pub rgb: ArrayLayout,
    pub depth: ArrayLayout,
    pub pointcloud: ArrayLayout,
    pub transform: ArrayLayout,
}

impl fmt::Display for FrameLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "rgb={} depth={} pointcloud={} transform={}",
            self.rgb, self.depth, self.pointcloud, self.transform
        )
    }
}

// ── Pose helpers ─────────────────────────────────────────────────

/// Row-major f64 4x4 transform from a rotation and a translation.
pub fn pose_matrix(rotation: DQuat, translation: DVec3) -> NdArray {
    let m = DMat4::from_rotation_translation(rotation, translation);
    matrix_to_array(m)
}

/// Row-major f64 4x4 transform from a scalar-first quaternion and a
/// translation, as odometry units report them. The quaternion is
/// normalized; a zero quaternion yields no rotation.
pub fn pose_from_wxyz(qw: f64, qx: f64, qy: f64, qz: f64, tx: f64, ty: f64, tz: f64) -> NdArray {
    let q = DQuat::from_xyzw(qx, qy, qz, qw);
    let rotation = if q.length_squared() > f64::EPSILON {
        q.normalize()
    } else {
        DQuat::IDENTITY
    };
    pose_matrix(rotation, DVec3::new(tx, ty, tz))
}

/// The 4x4 identity transform.
pub fn identity_transform() -> NdArray {
    matrix_to_array(DMat4::IDENTITY)
}

fn matrix_to_array(m: DMat4) -> NdArray {
    let row_major = m.transpose().to_cols_array().to_vec();
    NdArray::from_parts(vec![4, 4], ArrayData::F64(row_major))
}
