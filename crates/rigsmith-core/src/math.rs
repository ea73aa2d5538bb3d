//! Geometry helpers shared by the builders and the in-memory scene.
//!
//! Rotation channels are Euler angles in degrees with `xyz` rotation order:
//! X is applied first, then Y, then Z.

use glam::{DMat3, DQuat, DVec3, EulerRot};

/// Tolerance below which a direction is treated as zero length.
pub const EPSILON: f64 = 1e-9;

/// Converts `xyz`-ordered Euler degrees into a quaternion.
pub fn euler_degrees_to_quat(degrees: DVec3) -> DQuat {
    DQuat::from_euler(
        EulerRot::ZYX,
        degrees.z.to_radians(),
        degrees.y.to_radians(),
        degrees.x.to_radians(),
    )
}

/// Converts a quaternion into `xyz`-ordered Euler degrees.
pub fn quat_to_euler_degrees(rotation: DQuat) -> DVec3 {
    let (z, y, x) = rotation.to_euler(EulerRot::ZYX);
    DVec3::new(x.to_degrees(), y.to_degrees(), z.to_degrees())
}

/// Orientation whose X axis points from `from` to `to` with Y as close to
/// `up` as possible.
///
/// Falls back to world Z as the secondary axis when the chain runs
/// parallel to `up`, and to identity when `from == to`.
pub fn chain_frame(from: DVec3, to: DVec3, up: DVec3) -> DQuat {
    let x = (to - from).normalize_or_zero();
    if x.length_squared() < EPSILON {
        return DQuat::IDENTITY;
    }

    let mut z = x.cross(up);
    if z.length_squared() < EPSILON {
        z = x.cross(DVec3::Z);
        if z.length_squared() < EPSILON {
            z = x.cross(DVec3::X);
        }
    }
    let z = z.normalize();
    let y = z.cross(x);

    DQuat::from_mat3(&DMat3::from_cols(x, y, z)).normalize()
}

/// Shortest-arc spherical blend between two orientations.
///
/// `weight_b` is the share of `b`: `0.0` returns `a`, `1.0` returns `b`.
pub fn blend_orientations(a: DQuat, b: DQuat, weight_b: f64) -> DQuat {
    let b = if a.dot(b) < 0.0 { -b } else { b };
    a.slerp(b, weight_b.clamp(0.0, 1.0)).normalize()
}

/// Weighted blend of any number of orientations.
///
/// Weights are normalized; returns `None` when they sum to zero.
pub fn blend_weighted(candidates: &[(DQuat, f64)]) -> Option<DQuat> {
    let total: f64 = candidates.iter().map(|(_, w)| w.max(0.0)).sum();
    if total <= EPSILON {
        return None;
    }

    let mut accumulated: Option<(DQuat, f64)> = None;
    for &(rotation, weight) in candidates {
        let weight = weight.max(0.0);
        if weight <= 0.0 {
            continue;
        }
        accumulated = Some(match accumulated {
            None => (rotation, weight),
            Some((current, sum)) => {
                let next_sum = sum + weight;
                (blend_orientations(current, rotation, weight / next_sum), next_sum)
            }
        });
    }
    accumulated.map(|(rotation, _)| rotation)
}

/// Arithmetic mean of a set of points, or zero for an empty set.
pub fn centroid(points: &[DVec3]) -> DVec3 {
    if points.is_empty() {
        return DVec3::ZERO;
    }
    points.iter().copied().sum::<DVec3>() / points.len() as f64
}

/// Resamples a polyline into `count` points evenly spaced by arc length.
pub fn resample_polyline(points: &[DVec3], count: usize) -> Vec<DVec3> {
    match (points.len(), count) {
        (_, 0) => return Vec::new(),
        (0, _) => return vec![DVec3::ZERO; count],
        (1, _) => return vec![points[0]; count],
        (_, 1) => return vec![points[0]],
        _ => {}
    }

    let lengths: Vec<f64> = points.windows(2).map(|w| w[0].distance(w[1])).collect();
    let total: f64 = lengths.iter().sum();
    if total <= EPSILON {
        return vec![points[0]; count];
    }

    (0..count)
        .map(|i| {
            let mut target = total * i as f64 / (count - 1) as f64;
            for (segment, &length) in lengths.iter().enumerate() {
                if target <= length || segment == lengths.len() - 1 {
                    let t = if length > EPSILON {
                        (target / length).min(1.0)
                    } else {
                        0.0
                    };
                    return points[segment].lerp(points[segment + 1], t);
                }
                target -= length;
            }
            points[points.len() - 1]
        })
        .collect()
}
