use glam::Vec3;


pub const fn pad_4(x: usize) -> usize {
    (x + 3) & !3
}

pub const fn round_up(x: usize, multiple: usize) -> usize {
    x.div_ceil(multiple) * multiple
}

pub fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}


/// least-squares plane through `points`: returns (centroid, upward normal)
///
/// normal is `None` when fewer than three points are given or they do not span a plane.
/// see http://www.ilikebigbits.com/2017_09_25_plane_from_points_2.html
pub fn plane_from_points(points: &[Vec3]) -> (Vec3, Option<Vec3>) {
    let n = points.len();
    if n == 0 {
        return (Vec3::ZERO, None);
    }

    let centroid = points.iter().copied().sum::<Vec3>() / n as f32;
    if n < 3 {
        return (centroid, None);
    }

    let (mut xx, mut xy, mut xz, mut yy, mut yz, mut zz) = (0.0, 0.0, 0.0, 0.0, 0.0, 0.0);
    for p in points {
        let r = *p - centroid;
        xx += r.x * r.x;
        xy += r.x * r.y;
        xz += r.x * r.z;
        yy += r.y * r.y;
        yz += r.y * r.z;
        zz += r.z * r.z;
    }

    let n = n as f32;
    let (xx, xy, xz, yy, yz, zz) = (xx / n, xy / n, xz / n, yy / n, yz / n, zz / n);

    let det_x = yy * zz - yz * yz;
    let det_y = xx * zz - xz * xz;
    let det_z = xx * yy - xy * xy;

    let axes = [
        (det_x, Vec3::new(det_x, xz * yz - xy * zz, xy * yz - xz * yy)),
        (det_y, Vec3::new(xz * yz - xy * zz, det_y, xy * xz - yz * xx)),
        (det_z, Vec3::new(xy * yz - xz * yy, xy * xz - yz * xx, det_z)),
    ];

    let mut weighted_dir = Vec3::ZERO;
    for (det, axis_dir) in axes {
        let mut weight = det * det;
        if weighted_dir.dot(axis_dir) < 0.0 {
            weight = -weight;
        }
        weighted_dir += axis_dir * weight;
    }

    let length = weighted_dir.length();
    if length == 0.0 || !length.is_finite() {
        return (centroid, None);
    }

    let normal = weighted_dir / length;
    let normal = if normal.y < 0.0 { -normal } else { normal };

    (centroid, Some(normal))
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_up() {
        assert_eq!(pad_4(5), 8);
        assert_eq!(round_up(0, 1024), 0);
        assert_eq!(round_up(1, 1024), 1024);
        assert_eq!(round_up(1024, 1024), 1024);
        assert_eq!(round_up(1025, 1024), 2048);
    }

    #[test]
    fn test_sigmoid() {
        assert_eq!(sigmoid(0.0), 0.5);
        assert!(sigmoid(20.0) > 0.999);
        assert!(sigmoid(-20.0) < 0.001);
    }

    #[test]
    fn test_plane_from_ground_points() {
        let points = [
            Vec3::new(0.0, 1.0, 0.0),
            Vec3::new(4.0, 1.0, 0.0),
            Vec3::new(0.0, 1.0, 4.0),
            Vec3::new(4.0, 1.0, 4.0),
            Vec3::new(2.0, 1.0, 1.0),
        ];

        let (center, up) = plane_from_points(&points);
        let up = up.expect("points span a plane");

        assert!((center.y - 1.0).abs() < 1e-6);
        assert!((up - Vec3::Y).length() < 1e-4);
    }

    #[test]
    fn test_plane_degenerate() {
        let (center, up) = plane_from_points(&[Vec3::ONE, Vec3::ZERO]);
        assert_eq!(center, Vec3::splat(0.5));
        assert!(up.is_none());
    }
}
