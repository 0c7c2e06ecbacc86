use crisp8::emulator::basics::{KEY_CHARS, SCREEN_HEIGHT, SCREEN_WIDTH, TICK_PERIOD};
use crisp8::emulator::vm::{TickError, VirtualMachine};
use lazy_static::lazy_static;
use sfml::graphics::{Color, RectangleShape, RenderTarget, RenderWindow, Shape, Transformable};
use sfml::system::Vector2f;
use sfml::window::{ContextSettings, Event, Key, Style, VideoMode};
use std::collections::HashMap;
use std::iter;
use std::time::Instant;

lazy_static! {
    static ref KEYMAP: HashMap<u8, Key> = KEY_CHARS
        .iter()
        .enumerate()
        .map(|(index, chr)| (index as u8, key_for_char(*chr)))
        .collect();
}

fn key_for_char(chr: char) -> Key {
    match chr {
        '1' => Key::Num1,
        '2' => Key::Num2,
        '3' => Key::Num3,
        '4' => Key::Num4,
        'q' => Key::Q,
        'w' => Key::W,
        'e' => Key::E,
        'r' => Key::R,
        'a' => Key::A,
        's' => Key::S,
        'd' => Key::D,
        'f' => Key::F,
        'z' => Key::Z,
        'x' => Key::X,
        'c' => Key::C,
        'v' => Key::V,
        _ => Key::Unknown,
    }
}

fn pad_key_for(code: Key) -> Option<u8> {
    KEYMAP
        .iter()
        .find(|(_, key)| **key == code)
        .map(|(index, _)| *index)
}

fn init_window(scale: u32) -> RenderWindow {
    let video_mode = VideoMode::new(
        SCREEN_WIDTH as u32 * scale,
        SCREEN_HEIGHT as u32 * scale,
        32,
    );
    let mut window = RenderWindow::new(
        video_mode,
        "crisp8",
        Style::CLOSE,
        &ContextSettings::default(),
    );
    window.set_framerate_limit(60);
    window
}

fn init_pixels(
    scale: u32,
) -> [[RectangleShape<'static>; SCREEN_HEIGHT]; SCREEN_WIDTH] {
    let mut pixels: [[RectangleShape; SCREEN_HEIGHT]; SCREEN_WIDTH] = iter::repeat(
        iter::repeat(RectangleShape::new())
            .collect::<arrayvec::ArrayVec<_>>()
            .into_inner()
            .unwrap(),
    )
    .collect::<arrayvec::ArrayVec<_>>()
    .into_inner()
    .unwrap();
    for x in 0..SCREEN_WIDTH {
        for y in 0..SCREEN_HEIGHT {
            let pixel = &mut pixels[x][y];
            pixel.set_size(Vector2f::new(scale as f32, scale as f32));
            pixel.set_position(Vector2f::new(
                (scale * x as u32) as f32,
                (scale * y as u32) as f32,
            ));
            pixel.set_fill_color(Color::WHITE);
        }
    }
    pixels
}

/// Opens the window and drives the machine until the window closes or the
/// machine faults. Each displayed frame runs as many cycles as wall-clock
/// time since the previous frame calls for, so the machine keeps its nominal
/// speed regardless of the frame rate.
pub fn run(vm: &mut VirtualMachine, scale: u32) -> Result<(), TickError> {
    let mut window = init_window(scale);
    let pixels = init_pixels(scale);
    let mut previous_frame: Option<Instant> = None;
    let mut rendered = false;

    while window.is_open() {
        while let Some(event) = window.poll_event() {
            match event {
                Event::Closed => window.close(),
                Event::KeyPressed { code, .. } => {
                    if let Some(key) = pad_key_for(code) {
                        vm.set_key(key, true);
                    }
                }
                Event::KeyReleased { code, .. } => {
                    if let Some(key) = pad_key_for(code) {
                        vm.set_key(key, false);
                    }
                }
                _ => {}
            }
        }

        let now = Instant::now();
        let pending_ticks = match previous_frame {
            None => 1,
            Some(previous) => {
                (now.duration_since(previous).as_micros() / TICK_PERIOD.as_micros()) as u64
            }
        };
        previous_frame = Some(now);

        for _ in 0..pending_ticks {
            if let Err(fault) = vm.tick() {
                log::error!("machine halted: {}", fault);
                return Err(fault);
            }
        }

        if vm.is_dirty() || !rendered {
            window.clear(Color::BLACK);
            let framebuffer = vm.framebuffer();
            for x in 0..SCREEN_WIDTH {
                for y in 0..SCREEN_HEIGHT {
                    if framebuffer[y * SCREEN_WIDTH + x] {
                        window.draw(&pixels[x][y]);
                    }
                }
            }
            window.display();
            vm.clear_dirty();
            rendered = true;
        }
    }
    Ok(())
}
