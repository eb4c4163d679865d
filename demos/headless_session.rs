//! Drives a complete rendering session against the headless backend: load
//! a synthetic field, shape the transfer function, nudge the camera with a
//! scripted drag and report what the traversal decided per frame.
//!
//! Run with `cargo run --example headless_session`.

use brickslice::gpu::HeadlessGpu;
use brickslice::host::Host;
use brickslice::renderer::{HeadlessWindow, WindowEvent};

fn write_synthetic_field(base: &std::path::Path) -> std::io::Result<()> {
    let size = 64usize;
    let endianness = if cfg!(target_endian = "little") { 'l' } else { 'b' };
    let header = format!(
        "element_kind : f\nelement_size : 4\nendianness : {}\ndimensions : 3\norder : C\n\
         x_size : {s}\ny_size : {s}\nz_size : {s}\ndx : 1.0\ndy : 1.0\ndz : 0.5\n",
        endianness,
        s = size
    );
    std::fs::write(base.with_extension("dat"), header)?;

    // a dense ball of values falling off toward the boundary
    let half = (size / 2) as f32;
    let mut bytes = Vec::with_capacity(size * size * size * 4);
    for z in 0..size {
        for y in 0..size {
            for x in 0..size {
                let dx = (x as f32 - half) / half;
                let dy = (y as f32 - half) / half;
                let dz = (z as f32 - half) / half;
                let value = (1.0 - (dx * dx + dy * dy + dz * dz).sqrt()).max(0.0);
                bytes.extend_from_slice(&value.to_ne_bytes());
            }
        }
    }
    std::fs::write(base.with_extension("raw"), bytes)
}

fn main() {
    env_logger::init();

    let base = std::env::temp_dir().join("brickslice_demo_field");
    write_synthetic_field(&base).expect("could not write the demo field");
    let base = base.to_str().expect("temp path is not valid UTF-8");

    // a scripted drag, consumed by the first frame
    let mut window = HeadlessWindow::new();
    window.queued_events.extend([
        WindowEvent::MouseButtonPressed { x: 300.0, y: 300.0 },
        WindowEvent::CursorMoved { x: 360.0, y: 280.0 },
        WindowEvent::MouseButtonReleased,
    ]);

    let mut host = Host::new();
    host.initialize(Box::new(HeadlessGpu::new()), Box::new(window))
        .expect("initialization failed");

    host.set_brick_size_power_of_two(4).unwrap();
    host.set_minimum_sub_brick_size(4).unwrap();
    host.set_sub_brick_boundary_indicator_creation(1).unwrap();
    host.set_field_from_bifrost_file("density_ball", base)
        .expect("field load failed");

    // fade the low end out and brighten the core
    host.update_transfer_function_lower_node_value(3, 0.0).unwrap();
    host.update_transfer_function_node_value(3, 96, 0.02).unwrap();
    host.update_transfer_function_node_value(3, 224, 0.9).unwrap();
    host.set_lower_visibility_threshold(0.01).unwrap();

    for frame in 0..5 {
        host.step().expect("frame failed");

        {
            let context = host.context().expect("initialized");
            let bricked = context.bricked_field().expect("field loaded");
            let root = bricked.tree().node(bricked.tree().root());
            println!(
                "frame {}: {} bricks, root visibility ratio {:.3}, {} plane slots",
                frame,
                bricked.brick_count(),
                root.visibility_ratio(),
                context.slicer().max_plane_count(),
            );
        }

        host.refresh_frame().unwrap();
    }

    host.cleanup().expect("cleanup failed");
    println!("session finished cleanly");
}
