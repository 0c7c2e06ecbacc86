//! CHIP-8 virtual machine.
//!
//! The `emulator` module is the whole machine: memory, registers, timers,
//! framebuffer and the instruction set, driven one cycle at a time through
//! [`emulator::vm::VirtualMachine::tick`]. Window, input and timing live in
//! the binary, which only reads the framebuffer and writes the keypad.

pub mod emulator;
