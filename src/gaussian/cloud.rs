use glam::Vec3;
use serde::{
    Deserialize,
    Serialize,
};

use crate::{
    error::{
        SplatError,
        SplatResult,
    },
    gaussian::{
        aabb::Aabb,
        packed::{
            Covariance3d,
            Gaussian,
            GaussianCompressed,
            GAUSSIAN_COMPRESSED_WORDS,
            GAUSSIAN_WORDS,
        },
        quantization::GaussianQuantization,
    },
    material::spherical_harmonics::{
        MAX_SH_DEGREE,
        ShCoefficients,
        ShCoefficientsCompressed,
    },
    math::plane_from_points,
};


/// `up` is only reported for scenes at least this large
const MIN_UP_RADIUS: f32 = 10.0;


/// optional scene parameters carried alongside the splats
#[derive(
    Clone,
    Debug,
    Default,
    PartialEq,
    Serialize,
    Deserialize,
)]
pub struct CloudMetadata {
    pub kernel_size: Option<f32>,
    pub mip_splatting: Option<bool>,
    pub background_color: Option<[f32; 3]>,
}


#[derive(Clone, Debug, PartialEq)]
pub enum SplatData {
    Full {
        gaussians: Vec<Gaussian>,
        sh: Vec<ShCoefficients>,
    },
    Compressed {
        gaussians: Vec<GaussianCompressed>,
        sh: Vec<ShCoefficientsCompressed>,
        covars: Vec<Covariance3d>,
        quantization: GaussianQuantization,
    },
}


/// immutable decoded point cloud, ready for upload
#[derive(Clone, Debug, PartialEq)]
pub struct PointCloud {
    data: SplatData,
    num_points: usize,
    sh_deg: usize,
    metadata: CloudMetadata,
    aabb: Aabb,
    center: Vec3,
    up: Option<Vec3>,
}

impl PointCloud {
    pub fn new(
        gaussians: Vec<Gaussian>,
        sh: Vec<ShCoefficients>,
        sh_deg: usize,
        metadata: CloudMetadata,
    ) -> SplatResult<Self> {
        check_degree(sh_deg)?;

        if sh.len() != gaussians.len() {
            return Err(SplatError::schema(format!(
                "{} sh blocks for {} gaussians",
                sh.len(),
                gaussians.len(),
            )));
        }

        let positions = gaussians.iter().map(Gaussian::position).collect::<Vec<_>>();

        Ok(Self::finish(
            SplatData::Full { gaussians, sh },
            positions,
            sh_deg,
            metadata,
        ))
    }

    /// a compressed cloud is only valid with both its covariance table and quantization record
    pub fn compressed(
        gaussians: Vec<GaussianCompressed>,
        sh: Vec<ShCoefficientsCompressed>,
        sh_deg: usize,
        covars: Option<Vec<Covariance3d>>,
        quantization: Option<GaussianQuantization>,
        metadata: CloudMetadata,
    ) -> SplatResult<Self> {
        check_degree(sh_deg)?;

        let covars = covars.ok_or_else(|| {
            SplatError::CompressionState("compressed cloud has no covariance table".to_string())
        })?;
        let quantization = quantization.ok_or_else(|| {
            SplatError::CompressionState("compressed cloud has no quantization record".to_string())
        })?;

        for (idx, gaussian) in gaussians.iter().enumerate() {
            if gaussian.geometry_idx as usize >= covars.len() {
                return Err(SplatError::schema(format!(
                    "gaussian {idx} references covariance {} of {}",
                    gaussian.geometry_idx,
                    covars.len(),
                )));
            }

            if gaussian.sh_idx as usize >= sh.len() {
                return Err(SplatError::schema(format!(
                    "gaussian {idx} references sh block {} of {}",
                    gaussian.sh_idx,
                    sh.len(),
                )));
            }
        }

        let positions = gaussians.iter().map(GaussianCompressed::position).collect::<Vec<_>>();

        Ok(Self::finish(
            SplatData::Compressed {
                gaussians,
                sh,
                covars,
                quantization,
            },
            positions,
            sh_deg,
            metadata,
        ))
    }

    fn finish(
        data: SplatData,
        positions: Vec<Vec3>,
        sh_deg: usize,
        metadata: CloudMetadata,
    ) -> Self {
        let aabb = Aabb::from_points(positions.iter().copied());
        let (center, up) = plane_from_points(&positions);
        let up = up.filter(|_| aabb.radius() >= MIN_UP_RADIUS);

        Self {
            data,
            num_points: positions.len(),
            sh_deg,
            metadata,
            aabb,
            center,
            up,
        }
    }

    pub fn num_points(&self) -> usize {
        self.num_points
    }

    pub fn is_empty(&self) -> bool {
        self.num_points == 0
    }

    pub fn sh_deg(&self) -> usize {
        self.sh_deg
    }

    pub fn is_compressed(&self) -> bool {
        matches!(self.data, SplatData::Compressed { .. })
    }

    pub fn data(&self) -> &SplatData {
        &self.data
    }

    pub fn metadata(&self) -> &CloudMetadata {
        &self.metadata
    }

    pub fn aabb(&self) -> &Aabb {
        &self.aabb
    }

    pub fn center(&self) -> Vec3 {
        self.center
    }

    pub fn up(&self) -> Option<Vec3> {
        self.up
    }

    /// 32-bit words per gaussian record
    pub fn record_words(&self) -> usize {
        match self.data {
            SplatData::Full { .. } => GAUSSIAN_WORDS,
            SplatData::Compressed { .. } => GAUSSIAN_COMPRESSED_WORDS,
        }
    }

    pub fn position(&self, idx: usize) -> Vec3 {
        match &self.data {
            SplatData::Full { gaussians, .. } => gaussians[idx].position(),
            SplatData::Compressed { gaussians, .. } => gaussians[idx].position(),
        }
    }

    pub fn positions(&self) -> impl Iterator<Item = Vec3> + '_ {
        (0..self.num_points).map(|idx| self.position(idx))
    }

    pub fn gaussian_bytes(&self) -> &[u8] {
        match &self.data {
            SplatData::Full { gaussians, .. } => bytemuck::cast_slice(gaussians),
            SplatData::Compressed { gaussians, .. } => bytemuck::cast_slice(gaussians),
        }
    }

    pub fn sh_bytes(&self) -> &[u8] {
        match &self.data {
            SplatData::Full { sh, .. } => bytemuck::cast_slice(sh),
            SplatData::Compressed { sh, .. } => bytemuck::cast_slice(sh),
        }
    }

    pub fn covars_bytes(&self) -> Option<&[u8]> {
        match &self.data {
            SplatData::Full { .. } => None,
            SplatData::Compressed { covars, .. } => Some(bytemuck::cast_slice(covars)),
        }
    }

    pub fn quantization(&self) -> Option<&GaussianQuantization> {
        match &self.data {
            SplatData::Full { .. } => None,
            SplatData::Compressed { quantization, .. } => Some(quantization),
        }
    }
}


fn check_degree(sh_deg: usize) -> SplatResult<()> {
    if sh_deg > MAX_SH_DEGREE {
        return Err(SplatError::DegreeMismatch {
            num_coefficients: (sh_deg + 1) * (sh_deg + 1),
        });
    }

    Ok(())
}


#[cfg(test)]
mod tests {
    use half::f16;

    use super::*;
    use crate::gaussian::quantization::Quantization;

    fn compressed_at(position: [f32; 3], geometry_idx: u32, sh_idx: u32) -> GaussianCompressed {
        GaussianCompressed {
            xyz: position.map(f16::from_f32),
            opacity: 0,
            scale_factor: 0,
            geometry_idx,
            sh_idx,
        }
    }

    #[test]
    fn test_num_points_matches_buffers() {
        let gaussians = vec![
            Gaussian::new(Vec3::ZERO, 1.0, [1.0, 0.0, 0.0, 1.0, 0.0, 1.0]),
            Gaussian::new(Vec3::ONE, 0.5, [1.0, 0.0, 0.0, 1.0, 0.0, 1.0]),
        ];
        let cloud = PointCloud::new(
            gaussians,
            vec![ShCoefficients::default(); 2],
            0,
            CloudMetadata::default(),
        ).unwrap();

        assert_eq!(cloud.num_points(), 2);
        assert_eq!(cloud.gaussian_bytes().len() / (cloud.record_words() * 4), 2);
        assert_eq!(cloud.sh_bytes().len() / 96, 2);
        assert_eq!(cloud.aabb().max, Vec3::ONE);
        assert!(cloud.up().is_none());
    }

    #[test]
    fn test_mismatched_sh_is_rejected() {
        let result = PointCloud::new(
            vec![Gaussian::default()],
            vec![],
            0,
            CloudMetadata::default(),
        );

        assert!(matches!(result, Err(SplatError::Schema(_))));
    }

    #[test]
    fn test_compressed_requires_covars_and_quantization() {
        let gaussians = vec![compressed_at([0.0; 3], 0, 0)];
        let sh = vec![ShCoefficientsCompressed::default()];
        let covars = vec![Covariance3d::from([1.0, 0.0, 0.0, 1.0, 0.0, 1.0])];
        let quantization = GaussianQuantization {
            opacity: Quantization::new(0, 0.01),
            ..Default::default()
        };

        let missing_covars = PointCloud::compressed(
            gaussians.clone(),
            sh.clone(),
            0,
            None,
            Some(quantization),
            CloudMetadata::default(),
        );
        assert!(matches!(missing_covars, Err(SplatError::CompressionState(_))));

        let missing_quantization = PointCloud::compressed(
            gaussians.clone(),
            sh.clone(),
            0,
            Some(covars.clone()),
            None,
            CloudMetadata::default(),
        );
        assert!(matches!(missing_quantization, Err(SplatError::CompressionState(_))));

        let cloud = PointCloud::compressed(
            gaussians,
            sh,
            0,
            Some(covars),
            Some(quantization),
            CloudMetadata::default(),
        ).unwrap();
        assert!(cloud.is_compressed());
        assert_eq!(cloud.record_words(), GAUSSIAN_COMPRESSED_WORDS);
        assert_eq!(cloud.covars_bytes().map(<[u8]>::len), Some(12));
    }

    #[test]
    fn test_compressed_index_out_of_range() {
        let result = PointCloud::compressed(
            vec![compressed_at([0.0; 3], 1, 0)],
            vec![ShCoefficientsCompressed::default()],
            0,
            Some(vec![Covariance3d::default()]),
            Some(GaussianQuantization::default()),
            CloudMetadata::default(),
        );

        assert!(matches!(result, Err(SplatError::Schema(_))));
    }

    #[test]
    fn test_large_scene_reports_up() {
        let gaussians = (0..64)
            .map(|i| {
                let x = (i % 8) as f32 * 4.0;
                let z = (i / 8) as f32 * 4.0;
                Gaussian::new(Vec3::new(x, -2.0, z), 1.0, [0.0; 6])
            })
            .collect::<Vec<_>>();
        let cloud = PointCloud::new(
            gaussians,
            vec![ShCoefficients::default(); 64],
            0,
            CloudMetadata::default(),
        ).unwrap();

        let up = cloud.up().expect("large planar scene has an up vector");
        assert!((up - Vec3::Y).length() < 1e-3);
        assert!((cloud.center().y + 2.0).abs() < 1e-3);
    }
}
