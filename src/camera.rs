use glam::{
    Mat4,
    Quat,
    Vec3,
};
use serde::{
    Deserialize,
    Serialize,
};


/// the only camera state the sort needs: a view and projection transform
pub trait Camera {
    fn view_matrix(&self) -> Mat4;
    fn proj_matrix(&self) -> Mat4;

    fn view_proj_matrix(&self) -> Mat4 {
        self.proj_matrix() * self.view_matrix()
    }

    fn position(&self) -> Vec3 {
        self.view_matrix().inverse().w_axis.truncate()
    }
}


#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Serialize,
    Deserialize,
)]
pub struct PerspectiveCamera {
    pub position: Vec3,
    pub rotation: Quat,
    pub fovy: f32,
    pub aspect: f32,
    pub znear: f32,
    pub zfar: f32,
}

impl Default for PerspectiveCamera {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            fovy: 45.0_f32.to_radians(),
            aspect: 16.0 / 9.0,
            znear: 0.01,
            zfar: 1000.0,
        }
    }
}

impl PerspectiveCamera {
    pub fn look_at(eye: Vec3, target: Vec3, up: Vec3) -> Self {
        let world_from_view = Mat4::look_at_rh(eye, target, up).inverse();
        let (_, rotation, _) = world_from_view.to_scale_rotation_translation();

        Self {
            position: eye,
            rotation,
            ..Default::default()
        }
    }
}

impl Camera for PerspectiveCamera {
    fn view_matrix(&self) -> Mat4 {
        Mat4::from_rotation_translation(self.rotation, self.position).inverse()
    }

    fn proj_matrix(&self) -> Mat4 {
        Mat4::perspective_rh(self.fovy, self.aspect, self.znear, self.zfar)
    }

    fn position(&self) -> Vec3 {
        self.position
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_look_at_places_target_ahead() {
        let camera = PerspectiveCamera::look_at(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO, Vec3::Y);
        let view = camera.view_matrix();

        let target = view.transform_point3(Vec3::ZERO);
        assert!((target - Vec3::new(0.0, 0.0, -5.0)).length() < 1e-5);

        let default_position = Camera::position(&camera);
        assert_eq!(default_position, Vec3::new(0.0, 0.0, 5.0));
    }
}
