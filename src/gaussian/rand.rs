use glam::Vec3;
use rand::{
    prelude::Distribution,
    Rng,
    SeedableRng,
    rngs::StdRng,
};

use crate::{
    gaussian::{
        cloud::{
            CloudMetadata,
            PointCloud,
        },
        covariance::{
            compute_covariance_3d,
            normalize_rotation,
        },
        packed::Gaussian,
    },
    material::spherical_harmonics::{
        MAX_SH_DEGREE,
        SH_CHANNELS,
        SH_COEFF_COUNT_PER_CHANNEL,
        ShCoefficients,
    },
};


impl Distribution<Gaussian> for rand::distributions::Standard {
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Gaussian {
        let rotation = normalize_rotation(
            rng.gen_range(-1.0..1.0),
            rng.gen_range(-1.0..1.0),
            rng.gen_range(-1.0..1.0),
            rng.gen_range(-1.0..1.0),
        );
        let scale = Vec3::new(
            rng.gen_range(0.01..1.0),
            rng.gen_range(0.01..1.0),
            rng.gen_range(0.01..1.0),
        );

        Gaussian::new(
            Vec3::new(
                rng.gen_range(-20.0..20.0),
                rng.gen_range(-20.0..20.0),
                rng.gen_range(-20.0..20.0),
            ),
            rng.gen_range(0.0..0.8),
            compute_covariance_3d(rotation, scale),
        )
    }
}

impl Distribution<ShCoefficients> for rand::distributions::Standard {
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> ShCoefficients {
        let dc = [
            rng.gen_range(-1.0..1.0),
            rng.gen_range(-1.0..1.0),
            rng.gen_range(-1.0..1.0),
        ];
        let rest = (0..(SH_COEFF_COUNT_PER_CHANNEL - 1) * SH_CHANNELS)
            .map(|_| rng.gen_range(-1.0..1.0))
            .collect::<Vec<f32>>();

        ShCoefficients::from_channel_major(dc, &rest, MAX_SH_DEGREE)
    }
}


pub fn random_cloud(n: usize) -> PointCloud {
    random_cloud_seeded(n, rand::thread_rng().r#gen())
}

pub fn random_cloud_seeded(n: usize, seed: u64) -> PointCloud {
    let mut rng = StdRng::seed_from_u64(seed);

    let gaussians: Vec<Gaussian> = (0..n).map(|_| rng.r#gen()).collect();
    let sh: Vec<ShCoefficients> = (0..n).map(|_| rng.r#gen()).collect();

    match PointCloud::new(gaussians, sh, MAX_SH_DEGREE, CloudMetadata::default()) {
        Ok(cloud) => cloud,
        Err(err) => unreachable!("random cloud is always consistent: {err}"),
    }
}

/// keys spanning negative, zero and positive values with duplicates
pub fn random_keys(n: usize, seed: u64) -> Vec<f32> {
    let mut rng = StdRng::seed_from_u64(seed);

    (0..n)
        .map(|_| match rng.gen_range(0..8) {
            0 => 0.0,
            1 => -0.0,
            2 => rng.gen_range(-4..4) as f32,
            _ => rng.gen_range(-1000.0..1000.0),
        })
        .collect()
}
