use glam::{
    Mat3,
    Quat,
    Vec3,
};


const MIN_ROTATION_NORM: f32 = 1e-8;


/// normalize a (w, x, y, z) rotation, falling back to identity when degenerate
pub fn normalize_rotation(w: f32, x: f32, y: f32, z: f32) -> Quat {
    let norm = w.hypot(x).hypot(y.hypot(z));
    if !norm.is_finite() || norm < MIN_ROTATION_NORM {
        return Quat::IDENTITY;
    }

    Quat::from_xyzw(x / norm, y / norm, z / norm, w / norm)
}


/// upper triangle `[c00, c01, c02, c11, c12, c22]` of `R S Sᵀ Rᵀ`
#[allow(non_snake_case)]
pub fn compute_covariance_3d(rotation: Quat, scale: Vec3) -> [f32; 6] {
    let R = Mat3::from_quat(rotation);
    let S = Mat3::from_diagonal(scale);

    let M = R * S;
    let Sigma = M * M.transpose();

    [
        Sigma.x_axis.x,
        Sigma.y_axis.x,
        Sigma.z_axis.x,
        Sigma.y_axis.y,
        Sigma.z_axis.y,
        Sigma.z_axis.z,
    ]
}
