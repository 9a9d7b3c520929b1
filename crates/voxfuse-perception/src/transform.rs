//! Time-indexed Transform Frame (TF) buffer and bounded-wait resolver.
//!
//! Maintains a directed graph of named reference frames where every edge
//! carries a short *history* of stamped rigid-body transforms rather than a
//! single value.  A lookup asks for the transform between two frames at an
//! exact timestamp; each edge on the path is sampled at that instant by
//! interpolating between the bracketing broadcasts.
//!
//! [`TfBuffer`] is the synchronous core.  [`TfResolver`] wraps it behind a
//! lock and a [`tokio::sync::Notify`] so a caller can wait – up to a hard
//! timeout – for a transform that has not been broadcast yet.
//!
//! # Example
//!
//! ```rust
//! use chrono::Utc;
//! use voxfuse_perception::transform::{TfBuffer, Transform3D, Vec3, Quaternion};
//!
//! let mut tf = TfBuffer::new();
//! let stamp = Utc::now();
//!
//! // camera is 1 m forward of world origin at `stamp`.
//! tf.insert("world", "camera", stamp,
//!     Transform3D::new(Vec3::new(1.0, 0.0, 0.0), Quaternion::identity()));
//!
//! let t = tf.lookup_at("world", "camera", stamp).unwrap();
//! assert!((t.translation.x - 1.0).abs() < 1e-5);
//! ```

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::Notify;
use tracing::trace;

/// How much broadcast history each edge retains, relative to its newest
/// sample.  Older samples are pruned on insert.
fn default_history_window() -> chrono::Duration {
    chrono::Duration::seconds(10)
}

// ────────────────────────────────────────────────────────────────────────────
// Primitive types
// ────────────────────────────────────────────────────────────────────────────

/// A 3-D translation vector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn zero() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }

    pub fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }

    pub fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }

    pub fn scale(self, s: f32) -> Self {
        Self::new(self.x * s, self.y * s, self.z * s)
    }

    /// Squared Euclidean length.  Preferred for threshold comparisons since
    /// it avoids the rounding of a square root.
    pub fn norm_squared(self) -> f32 {
        self.x * self.x + self.y * self.y + self.z * self.z
    }

    /// Euclidean length.
    pub fn norm(self) -> f32 {
        self.norm_squared().sqrt()
    }

    /// Linear interpolation: `self` at t = 0, `other` at t = 1.
    pub fn lerp(self, other: Self, t: f32) -> Self {
        self.add(other.sub(self).scale(t))
    }
}

/// A unit quaternion representing a 3-D rotation (w, x, y, z convention).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quaternion {
    pub w: f32,
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Quaternion {
    /// Create a quaternion.  The caller is responsible for providing a unit
    /// quaternion (|q| = 1).
    pub fn new(w: f32, x: f32, y: f32, z: f32) -> Self {
        Self { w, x, y, z }
    }

    /// The identity rotation.
    pub fn identity() -> Self {
        Self::new(1.0, 0.0, 0.0, 0.0)
    }

    /// Hamilton product: compose two rotations.
    pub fn mul(self, rhs: Self) -> Self {
        Self::new(
            self.w * rhs.w - self.x * rhs.x - self.y * rhs.y - self.z * rhs.z,
            self.w * rhs.x + self.x * rhs.w + self.y * rhs.z - self.z * rhs.y,
            self.w * rhs.y - self.x * rhs.z + self.y * rhs.w + self.z * rhs.x,
            self.w * rhs.z + self.x * rhs.y - self.y * rhs.x + self.z * rhs.w,
        )
    }

    /// Conjugate (== inverse for a unit quaternion).
    pub fn conjugate(self) -> Self {
        Self::new(self.w, -self.x, -self.y, -self.z)
    }

    /// Rotate a vector by this quaternion: p' = q * p * q*.
    pub fn rotate(self, v: Vec3) -> Vec3 {
        let p = Self::new(0.0, v.x, v.y, v.z);
        let rotated = self.mul(p).mul(self.conjugate());
        Vec3::new(rotated.x, rotated.y, rotated.z)
    }

    fn dot(self, rhs: Self) -> f32 {
        self.w * rhs.w + self.x * rhs.x + self.y * rhs.y + self.z * rhs.z
    }

    fn normalize(self) -> Self {
        let n = self.dot(self).sqrt();
        if n <= f32::EPSILON {
            return Self::identity();
        }
        Self::new(self.w / n, self.x / n, self.y / n, self.z / n)
    }

    /// Normalized linear interpolation along the shorter arc.  Adequate for
    /// the small inter-broadcast rotations a transform stream carries.
    pub fn nlerp(self, other: Self, t: f32) -> Self {
        // Flip one endpoint if the quaternions sit on opposite hemispheres,
        // otherwise the blend takes the long way round.
        let other = if self.dot(other) < 0.0 {
            Self::new(-other.w, -other.x, -other.y, -other.z)
        } else {
            other
        };
        Self::new(
            self.w + (other.w - self.w) * t,
            self.x + (other.x - self.x) * t,
            self.y + (other.y - self.y) * t,
            self.z + (other.z - self.z) * t,
        )
        .normalize()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Transform3D
// ────────────────────────────────────────────────────────────────────────────

/// A rigid-body 3-D transform: rotation followed by translation.
///
/// Represents the pose of frame B relative to frame A: to convert a point
/// expressed in frame B into frame A, rotate it by `rotation` then add
/// `translation`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform3D {
    pub translation: Vec3,
    pub rotation: Quaternion,
}

impl Transform3D {
    pub fn new(translation: Vec3, rotation: Quaternion) -> Self {
        Self {
            translation,
            rotation,
        }
    }

    /// The identity transform.
    pub fn identity() -> Self {
        Self::new(Vec3::zero(), Quaternion::identity())
    }

    /// Compose two transforms: if `self` = T_A_B and `other` = T_B_C, the
    /// result is T_A_C.
    pub fn compose(self, other: Self) -> Self {
        let translated = self.translation.add(self.rotation.rotate(other.translation));
        let rotated = self.rotation.mul(other.rotation);
        Self::new(translated, rotated)
    }

    /// Invert the transform: if `self` = T_A_B, the result is T_B_A.
    pub fn inverse(self) -> Self {
        let inv_rot = self.rotation.conjugate();
        let inv_trans = inv_rot.rotate(self.translation).scale(-1.0);
        Self::new(inv_trans, inv_rot)
    }

    /// Sample the transform between `self` (at t = 0) and `other` (at t = 1).
    pub fn interpolate(self, other: Self, t: f32) -> Self {
        Self::new(
            self.translation.lerp(other.translation, t),
            self.rotation.nlerp(other.rotation, t),
        )
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Errors
// ────────────────────────────────────────────────────────────────────────────

/// Failure modes of a transform lookup.
///
/// [`TfError::NoPath`] and [`TfError::NotYetAvailable`] are transient – a
/// later broadcast may cure them, which is what [`TfResolver::resolve`]
/// waits for.  [`TfError::TooOld`] is permanent: the requested stamp has
/// already fallen out of the retained history.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TfError {
    #[error("no transform path from '{source_frame}' to '{target}'")]
    NoPath {
        target: String,
        source_frame: String,
    },

    #[error("stamp {stamp} predates retained transform history")]
    TooOld { stamp: DateTime<Utc> },

    #[error("no transform broadcast at or after {stamp} yet")]
    NotYetAvailable { stamp: DateTime<Utc> },

    #[error("transform '{source_frame}' -> '{target}' unavailable after {waited:?}: {last}")]
    Timeout {
        target: String,
        source_frame: String,
        waited: Duration,
        last: String,
    },
}

/// Outcome of sampling one edge at a timestamp.
enum EdgeSample {
    At(Transform3D),
    TooOld,
    NotYet,
}

// ────────────────────────────────────────────────────────────────────────────
// TfBuffer
// ────────────────────────────────────────────────────────────────────────────

/// A directed graph of named reference frames whose edges carry stamped
/// transform history.
///
/// Frames are identified by arbitrary string names (e.g. `"world"`,
/// `"camera"`, `"tsdf_origin"`).  An edge inserted as `parent → child` is
/// traversable in both directions during lookup; the reverse direction uses
/// the inverted transform.
#[derive(Debug)]
pub struct TfBuffer {
    /// `edges[parent][child]` = stamped transform history, newest-pruned to
    /// `history_window`.
    edges: HashMap<String, HashMap<String, BTreeMap<DateTime<Utc>, Transform3D>>>,
    /// Reverse adjacency: `parents[child]` = set of parents, for inverse
    /// traversal during BFS.
    parents: HashMap<String, HashSet<String>>,
    history_window: chrono::Duration,
}

impl Default for TfBuffer {
    fn default() -> Self {
        Self {
            edges: HashMap::new(),
            parents: HashMap::new(),
            history_window: default_history_window(),
        }
    }
}

impl TfBuffer {
    /// Create an empty buffer with the default 10 s history window.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty buffer retaining the given amount of edge history.
    pub fn with_history_window(window: chrono::Duration) -> Self {
        Self {
            history_window: window,
            ..Self::default()
        }
    }

    /// Record the transform from `parent_frame` to `child_frame` at `stamp`.
    ///
    /// Samples older than the history window (relative to the newest sample
    /// on the same edge) are pruned.
    pub fn insert(
        &mut self,
        parent_frame: &str,
        child_frame: &str,
        stamp: DateTime<Utc>,
        transform: Transform3D,
    ) {
        let history = self
            .edges
            .entry(parent_frame.to_string())
            .or_default()
            .entry(child_frame.to_string())
            .or_default();
        history.insert(stamp, transform);

        if let Some((&newest, _)) = history.last_key_value() {
            let cutoff = newest - self.history_window;
            while let Some((&oldest, _)) = history.first_key_value() {
                if oldest >= cutoff {
                    break;
                }
                history.pop_first();
            }
        }

        self.parents
            .entry(child_frame.to_string())
            .or_default()
            .insert(parent_frame.to_string());
    }

    /// Compute the [`Transform3D`] that maps points in `source_frame` into
    /// `target_frame` at exactly `stamp`.
    ///
    /// Each edge on the path is sampled at `stamp`: an exact broadcast is
    /// used as-is, otherwise the two bracketing broadcasts are interpolated.
    /// A stamp outside an edge's history fails with [`TfError::TooOld`] or
    /// [`TfError::NotYetAvailable`]; extrapolation is never attempted.
    pub fn lookup_at(
        &self,
        target_frame: &str,
        source_frame: &str,
        stamp: DateTime<Utc>,
    ) -> Result<Transform3D, TfError> {
        if target_frame == source_frame {
            return Ok(Transform3D::identity());
        }

        // BFS from target to source; each queue item carries the composed
        // transform accumulated from target_frame to the current node, so the
        // final composition maps source-frame points into the target frame.
        let mut queue: VecDeque<(String, Transform3D)> = VecDeque::new();
        let mut visited: HashSet<String> = HashSet::new();
        let mut saw_not_yet = false;
        let mut saw_too_old = false;

        queue.push_back((target_frame.to_string(), Transform3D::identity()));
        visited.insert(target_frame.to_string());

        while let Some((current, accumulated)) = queue.pop_front() {
            // Forward edges: current is the parent.
            if let Some(children) = self.edges.get(&current) {
                for (child, history) in children {
                    if visited.contains(child) {
                        continue;
                    }
                    match Self::sample(history, stamp) {
                        EdgeSample::At(edge_tf) => {
                            let composed = accumulated.compose(edge_tf);
                            if child == source_frame {
                                return Ok(composed);
                            }
                            visited.insert(child.clone());
                            queue.push_back((child.clone(), composed));
                        }
                        EdgeSample::TooOld => saw_too_old = true,
                        EdgeSample::NotYet => saw_not_yet = true,
                    }
                }
            }

            // Inverse edges: current is the child; traverse to its parents
            // with the inverted transform.
            if let Some(parent_set) = self.parents.get(&current) {
                for parent in parent_set {
                    if visited.contains(parent) {
                        continue;
                    }
                    let Some(history) =
                        self.edges.get(parent).and_then(|c| c.get(&current))
                    else {
                        continue;
                    };
                    match Self::sample(history, stamp) {
                        EdgeSample::At(edge_tf) => {
                            let composed = accumulated.compose(edge_tf.inverse());
                            if parent == source_frame {
                                return Ok(composed);
                            }
                            visited.insert(parent.clone());
                            queue.push_back((parent.clone(), composed));
                        }
                        EdgeSample::TooOld => saw_too_old = true,
                        EdgeSample::NotYet => saw_not_yet = true,
                    }
                }
            }
        }

        if saw_not_yet {
            Err(TfError::NotYetAvailable { stamp })
        } else if saw_too_old {
            Err(TfError::TooOld { stamp })
        } else {
            Err(TfError::NoPath {
                target: target_frame.to_string(),
                source_frame: source_frame.to_string(),
            })
        }
    }

    fn sample(history: &BTreeMap<DateTime<Utc>, Transform3D>, stamp: DateTime<Utc>) -> EdgeSample {
        if let Some(exact) = history.get(&stamp) {
            return EdgeSample::At(*exact);
        }
        let before = history.range(..stamp).next_back();
        let after = history.range(stamp..).next();
        match (before, after) {
            (Some((&t0, tf0)), Some((&t1, tf1))) => {
                let span = (t1 - t0).num_nanoseconds().unwrap_or(0);
                if span == 0 {
                    return EdgeSample::At(*tf0);
                }
                let elapsed = (stamp - t0).num_nanoseconds().unwrap_or(0);
                let t = (elapsed as f64 / span as f64) as f32;
                EdgeSample::At(tf0.interpolate(*tf1, t))
            }
            (None, Some(_)) => EdgeSample::TooOld,
            (Some(_), None) => EdgeSample::NotYet,
            (None, None) => EdgeSample::NotYet,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// TfResolver
// ────────────────────────────────────────────────────────────────────────────

/// Shared, bounded-wait front end over a [`TfBuffer`].
///
/// Broadcasters call [`TfResolver::insert`]; the fusion pipeline calls
/// [`TfResolver::resolve`], which waits – never past the given timeout – for
/// the transform to become resolvable.  Clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct TfResolver {
    buffer: Arc<RwLock<TfBuffer>>,
    notify: Arc<Notify>,
}

impl TfResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a stamped transform and wake any pending lookups.
    pub fn insert(
        &self,
        parent_frame: &str,
        child_frame: &str,
        stamp: DateTime<Utc>,
        transform: Transform3D,
    ) {
        {
            let mut buf = self.buffer.write().unwrap_or_else(|e| e.into_inner());
            buf.insert(parent_frame, child_frame, stamp, transform);
        }
        self.notify.notify_waiters();
    }

    /// Synchronous lookup against the current buffer contents.
    pub fn lookup_at(
        &self,
        target_frame: &str,
        source_frame: &str,
        stamp: DateTime<Utc>,
    ) -> Result<Transform3D, TfError> {
        let buf = self.buffer.read().unwrap_or_else(|e| e.into_inner());
        buf.lookup_at(target_frame, source_frame, stamp)
    }

    /// Resolve the transform mapping `source_frame` into `target_frame` at
    /// exactly `stamp`, waiting up to `timeout` for the required broadcasts.
    ///
    /// Transient failures ([`TfError::NoPath`], [`TfError::NotYetAvailable`])
    /// are re-checked on every insert; [`TfError::TooOld`] fails immediately.
    /// On expiry the error is [`TfError::Timeout`] carrying the last
    /// underlying failure.  There is no retry beyond the wait: policy for a
    /// failed frame belongs to the caller.
    pub async fn resolve(
        &self,
        target_frame: &str,
        source_frame: &str,
        stamp: DateTime<Utc>,
        timeout: Duration,
    ) -> Result<Transform3D, TfError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            // Arm the notification *before* the lookup so an insert landing
            // between the check and the await is not missed.
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let last = match self.lookup_at(target_frame, source_frame, stamp) {
                Ok(tf) => return Ok(tf),
                Err(e @ TfError::TooOld { .. }) => return Err(e),
                Err(e) => e,
            };
            trace!(target_frame, source_frame, %stamp, error = %last, "transform pending");

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Err(TfError::Timeout {
                    target: target_frame.to_string(),
                    source_frame: source_frame.to_string(),
                    waited: timeout,
                    last: last.to_string(),
                });
            }
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
