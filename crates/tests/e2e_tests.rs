//! End to end tests
#[cfg(test)]
#[expect(clippy::unwrap_used, reason = "Tests aren't so strict")]
mod e2e {
    use glam::Vec2;
    use particle_core::active_simulation::{self, ActiveSimulation, Event};
    use particle_core::rasterizer::Source;
    use particle_core::{ParticleConfig, Simulation};
    use rand::SeedableRng as _;

    const TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);

    fn rng() -> rand::rngs::StdRng {
        rand::rngs::StdRng::seed_from_u64(42)
    }

    /// Encode a solid white image as a PNG file, as if it were uploaded.
    fn white_png(width: u32, height: u32) -> Vec<u8> {
        let image = image::RgbaImage::from_pixel(width, height, image::Rgba([255, 255, 255, 255]));
        let mut bytes = Vec::new();
        image
            .write_to(
                &mut std::io::Cursor::new(&mut bytes),
                image::ImageFormat::Png,
            )
            .unwrap();
        bytes
    }

    fn image_source(bytes: &[u8]) -> Source {
        let decoded = particle_core::rasterizer::decode_image(bytes).unwrap();
        Source::Image(std::sync::Arc::new(decoded))
    }

    async fn next_event(simulation: &mut ActiveSimulation) -> Event {
        tokio::time::timeout(TIMEOUT, simulation.event_rx.recv())
            .await
            .unwrap()
            .unwrap()
    }

    #[test]
    fn uploaded_image_becomes_particles_then_reset_clears_them() {
        let config = ParticleConfig {
            gap: 1,
            ..ParticleConfig::default()
        };
        let mut simulation = Simulation::new(2, 2, config).unwrap();
        simulation.set_image(image_source(&white_png(2, 2)));
        let count = simulation.resample(&mut rng()).unwrap();

        assert_eq!(count, 4);
        assert_eq!(
            simulation.particles().origins(),
            &[
                Vec2::new(0.0, 0.0),
                Vec2::new(1.0, 0.0),
                Vec2::new(0.0, 1.0),
                Vec2::new(1.0, 1.0),
            ]
        );

        simulation.reset().unwrap();
        assert!(simulation.particles().is_empty());
        assert_eq!(simulation.config(), &ParticleConfig::default());
        assert!(matches!(simulation.source(), Source::Procedural));
    }

    #[test]
    fn pointer_pushes_particles_away_then_they_come_home() {
        let config = ParticleConfig {
            gap: 1,
            ..ParticleConfig::default()
        };
        let mut simulation = Simulation::new(40, 40, config).unwrap();
        simulation.set_image(image_source(&white_png(1, 1)));
        simulation.resample(&mut rng()).unwrap();

        for _ in 0..500 {
            simulation.tick(None);
        }
        let settled = simulation.particles().positions().to_vec();
        for (position, origin) in settled.iter().zip(simulation.particles().origins()) {
            assert!(position.distance(*origin) < 1.0);
        }

        let pointer = Vec2::new(20.0, 20.0);
        simulation.tick(Some(pointer));
        let pushed = simulation.particles().positions().to_vec();
        let moved_away = settled
            .iter()
            .zip(&pushed)
            .filter(|(before, after)| after.distance(pointer) > before.distance(pointer))
            .count();
        assert!(moved_away > 0);

        for _ in 0..500 {
            simulation.tick(None);
        }
        for (position, origin) in simulation
            .particles()
            .positions()
            .iter()
            .zip(simulation.particles().origins())
        {
            assert!(position.distance(*origin) < 1.0);
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn running_field_swaps_in_an_uploaded_image() {
        let mut simulation = ActiveSimulation::start(active_simulation::Config {
            width: 40,
            height: 30,
            frame_rate: 120,
            ..active_simulation::Config::default()
        })
        .unwrap();
        let Event::Resampled { count } = next_event(&mut simulation).await else {
            panic!("Expected the procedural pattern first");
        };
        assert!(count > 0);

        // A 10x10 image is fitted to 24x24 at (8, 3). With a gap of 5, that covers 5 sampled
        // columns and 5 sampled rows.
        simulation.load_image(white_png(10, 10)).unwrap();
        let event = next_event(&mut simulation).await;
        assert_eq!(event, Event::Resampled { count: 25 });

        let frame = loop {
            let frame = tokio::time::timeout(TIMEOUT, simulation.frame_rx.recv())
                .await
                .unwrap()
                .unwrap();
            if frame.particle_count == 25 {
                break frame;
            }
        };
        assert_eq!(frame.canvas.width, 40);

        simulation.set_pointer(Some(Vec2::new(20.0, 15.0)));
        simulation.reset().unwrap();
        assert_eq!(simulation.config(), ParticleConfig::default());
        let Event::Resampled { .. } = next_event(&mut simulation).await else {
            panic!("Expected the procedural pattern after a reset");
        };

        simulation.stop().await.unwrap();
        assert!(!simulation.is_running());
    }
}
