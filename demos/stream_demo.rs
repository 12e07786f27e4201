//! Casts a synthetic animation to http://localhost:8080/demo.gif
//!
//! Run with `cargo run --example stream_demo`, then open the URL in a
//! browser; refreshing shows the file growing until the demo finishes.

use bytes::Bytes;
use gifcast::{CastFlags, Caster, CasterParams, Frame, PixelFormat, PortRegistry};

const WIDTH: u32 = 160;
const HEIGHT: u32 = 120;
const FRAMES: u32 = 90;

fn render(tick: u32) -> Bytes {
    let mut data = Vec::with_capacity((WIDTH * HEIGHT * 4) as usize);
    for y in 0..HEIGHT {
        for x in 0..WIDTH {
            let r = ((x * 255 / WIDTH) + tick * 3) as u8;
            let g = (y * 255 / HEIGHT) as u8;
            let b = (tick * 2) as u8;
            data.extend_from_slice(&[r, g, b, 255]);
        }
    }
    Bytes::from(data)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("gifcast=debug".parse()?),
        )
        .init();

    let params = CasterParams::new("8080/demo.gif").flags(
        CastFlags::ALLOW_INTRA_FRAMES | CastFlags::LZW_COMPRESSION | CastFlags::SHOW_FINISHED_FILE,
    );
    let caster = Caster::connect(PortRegistry::global(), &params).await?;
    tracing::info!("Casting to http://localhost:8080/demo.gif");

    for tick in 0..FRAMES {
        let frame = Frame::new(
            WIDTH,
            HEIGHT,
            PixelFormat::Rgba8,
            render(tick),
            caster.elapsed_ms(),
            0,
        )?;
        caster.write_frame(frame).await?;
        tokio::time::sleep(std::time::Duration::from_millis(33)).await;
    }

    while caster.pending_packet_count().await > 0 {
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    caster.finish().await?;
    tracing::info!("Finished; serving the completed file until ctrl-c");

    tokio::signal::ctrl_c().await?;
    Ok(())
}
