use crisp8::emulator::basics::{ROM_CAPACITY, SCREEN_WIDTH};
use crisp8::emulator::rom::RomError;
use crisp8::emulator::vm::{TickError, VirtualMachine};

fn boot(program: &[u8]) -> VirtualMachine {
    let mut vm = VirtualMachine::new(0);
    vm.load_rom(program).unwrap();
    vm
}

#[test]
fn test_set_register_end_to_end() {
    let mut vm = boot(&[0x6A, 0x05]);
    vm.tick().unwrap();
    assert_eq!(vm.registers()[0xA], 5);
    assert_eq!(vm.pc(), 0x202);
}

#[test]
fn test_straight_line_instructions_advance_by_two() {
    // set, add-const, copy, or, and, xor, shift: all plain +2 opcodes.
    let mut vm = boot(&[
        0x61, 0x0F, 0x71, 0x01, 0x82, 0x10, 0x81, 0x21, 0x81, 0x22, 0x81, 0x23, 0x81, 0x16,
    ]);
    let mut expected_pc = 0x200;
    for _ in 0..7 {
        vm.tick().unwrap();
        expected_pc += 2;
        assert_eq!(vm.pc(), expected_pc);
    }
}

#[test]
fn test_skip_instructions_advance_by_four_iff_condition_holds() {
    // V1 = 7; skip-if-equal taken.
    let mut vm = boot(&[0x61, 0x07, 0x31, 0x07]);
    vm.tick().unwrap();
    vm.tick().unwrap();
    assert_eq!(vm.pc(), 0x206);

    let mut vm = boot(&[0x61, 0x07, 0x31, 0x08]);
    vm.tick().unwrap();
    vm.tick().unwrap();
    assert_eq!(vm.pc(), 0x204);

    let mut vm = boot(&[0x61, 0x07, 0x41, 0x08]);
    vm.tick().unwrap();
    vm.tick().unwrap();
    assert_eq!(vm.pc(), 0x206);

    // Register-to-register comparisons.
    let mut vm = boot(&[0x61, 0x07, 0x62, 0x07, 0x51, 0x20]);
    for _ in 0..3 {
        vm.tick().unwrap();
    }
    assert_eq!(vm.pc(), 0x208);

    let mut vm = boot(&[0x61, 0x07, 0x62, 0x09, 0x91, 0x20]);
    for _ in 0..3 {
        vm.tick().unwrap();
    }
    assert_eq!(vm.pc(), 0x208);
}

#[test]
fn test_add_with_carry_over_all_operands() {
    let mut vm = VirtualMachine::new(0);
    for a in 0..=255u16 {
        for b in 0..=255u16 {
            vm.load_rom(&[0x60, a as u8, 0x61, b as u8, 0x80, 0x14])
                .unwrap();
            vm.tick().unwrap();
            vm.tick().unwrap();
            vm.tick().unwrap();
            assert_eq!(vm.registers()[0], ((a + b) % 256) as u8);
            assert_eq!(vm.registers()[0xF], u8::from(a + b > 255));
        }
    }
}

#[test]
fn test_subtract_borrow_both_forms() {
    // 8XY5: flag reports "no borrow", V[y] <= V[x].
    for (vx, vy, result, flag) in [
        (0x0Au8, 0x08u8, 0x02u8, 1u8),
        (0x08, 0x0A, 0xFE, 0),
        (0x07, 0x07, 0x00, 1),
    ] {
        let mut vm = boot(&[0x60, vx, 0x61, vy, 0x80, 0x15]);
        for _ in 0..3 {
            vm.tick().unwrap();
        }
        assert_eq!(vm.registers()[0], result);
        assert_eq!(vm.registers()[0xF], flag);
    }

    // 8XY7 mirrors the test with the operands swapped.
    for (vx, vy, result, flag) in [
        (0x08u8, 0x0Au8, 0x02u8, 1u8),
        (0x0A, 0x08, 0xFE, 0),
        (0x07, 0x07, 0x00, 1),
    ] {
        let mut vm = boot(&[0x60, vx, 0x61, vy, 0x80, 0x17]);
        for _ in 0..3 {
            vm.tick().unwrap();
        }
        assert_eq!(vm.registers()[0], result);
        assert_eq!(vm.registers()[0xF], flag);
    }
}

#[test]
fn test_shifts_capture_pre_shift_bits() {
    for value in [0x01u8, 0x02, 0x81, 0xFE, 0xFF] {
        let mut vm = boot(&[0x60, value, 0x80, 0x06]);
        vm.tick().unwrap();
        vm.tick().unwrap();
        assert_eq!(vm.registers()[0], value >> 1);
        assert_eq!(vm.registers()[0xF], value & 0x01);

        let mut vm = boot(&[0x60, value, 0x80, 0x0E]);
        vm.tick().unwrap();
        vm.tick().unwrap();
        assert_eq!(vm.registers()[0], value << 1);
        assert_eq!(vm.registers()[0xF], value >> 7);
    }
}

#[test]
fn test_draw_twice_restores_pixels_and_reports_collision() {
    // Index register starts at 0, so both draws blit font glyph 0 at (0,0).
    let mut vm = boot(&[0xD0, 0x15, 0xD0, 0x15]);
    vm.tick().unwrap();
    assert_eq!(vm.registers()[0xF], 0);
    assert!(vm.is_dirty());
    assert!(vm.framebuffer().iter().any(|p| *p));
    vm.clear_dirty();

    vm.tick().unwrap();
    assert_eq!(vm.registers()[0xF], 1, "second draw collides with the first");
    assert!(vm.is_dirty(), "a draw always marks the screen dirty");
    assert!(vm.framebuffer().iter().all(|p| !*p), "XOR erased every pixel");
}

#[test]
fn test_clear_screen() {
    let mut vm = boot(&[0xD0, 0x15, 0x00, 0xE0]);
    vm.tick().unwrap();
    vm.clear_dirty();
    vm.tick().unwrap();
    assert!(vm.framebuffer().iter().all(|p| !*p));
    assert!(vm.is_dirty());
    assert_eq!(vm.pc(), 0x204);
}

#[test]
fn test_wait_key_freezes_then_latches_highest_key() {
    let mut vm = boot(&[0xF3, 0x0A]);
    for _ in 0..5 {
        vm.tick().unwrap();
        assert_eq!(vm.pc(), 0x200);
    }

    vm.set_key(0x2, true);
    vm.set_key(0x9, true);
    vm.tick().unwrap();
    assert_eq!(vm.pc(), 0x202);
    assert_eq!(vm.registers()[3], 0x9);
}

#[test]
fn test_wait_key_cycles_still_count_timers_down() {
    let mut vm = boot(&[0x60, 0x03, 0xF0, 0x15, 0xF0, 0x0A]);
    vm.tick().unwrap();
    vm.tick().unwrap();
    assert_eq!(vm.delay_timer(), 2, "set to 3, then one cycle elapsed");
    vm.tick().unwrap();
    vm.tick().unwrap();
    assert_eq!(vm.delay_timer(), 0);
    assert_eq!(vm.pc(), 0x204, "still parked on the key-wait");
}

#[test]
fn test_register_dump_and_load_round_trip() {
    let mut vm = boot(&[
        0x60, 0x11, 0x61, 0x22, 0x62, 0x33, // V0..V2
        0xA3, 0x00, 0xF2, 0x55, // dump V0..=V2 at 0x300
        0x60, 0x00, 0x61, 0x00, 0x62, 0x00, // wipe them
        0xA3, 0x00, 0xF2, 0x65, // load them back
    ]);
    for _ in 0..5 {
        vm.tick().unwrap();
    }
    assert_eq!(&vm.memory()[0x300..0x303], &[0x11, 0x22, 0x33]);
    assert_eq!(vm.index(), 0x303, "dump moves the index past the block");

    for _ in 0..3 {
        vm.tick().unwrap();
    }
    assert_eq!(&vm.registers()[0..3], &[0, 0, 0]);

    for _ in 0..2 {
        vm.tick().unwrap();
    }
    assert_eq!(&vm.registers()[0..3], &[0x11, 0x22, 0x33]);
    assert_eq!(vm.index(), 0x303, "load moves the index the same way");
}

#[test]
fn test_store_decimal_digits() {
    let mut vm = boot(&[0x60, 157, 0xA3, 0x00, 0xF0, 0x33]);
    for _ in 0..3 {
        vm.tick().unwrap();
    }
    assert_eq!(&vm.memory()[0x300..0x303], &[1, 5, 7]);
}

#[test]
fn test_call_and_return_flow() {
    let mut vm = boot(&[
        0x22, 0x06, // call 0x206
        0x6A, 0xFF, // executed after the return
        0x00, 0x00, // never reached
        0x00, 0xEE, // return
    ]);
    vm.tick().unwrap();
    assert_eq!(vm.pc(), 0x206);
    vm.tick().unwrap();
    assert_eq!(vm.pc(), 0x202, "return lands after the call");
    vm.tick().unwrap();
    assert_eq!(vm.registers()[0xA], 0xFF);
}

#[test]
fn test_jump_with_offset() {
    let mut vm = boot(&[0x60, 0x10, 0xB3, 0x00]);
    vm.tick().unwrap();
    vm.tick().unwrap();
    assert_eq!(vm.pc(), 0x310);
}

#[test]
fn test_font_addressing() {
    let mut vm = boot(&[0x6A, 0x07, 0xFA, 0x29]);
    vm.tick().unwrap();
    vm.tick().unwrap();
    assert_eq!(vm.index(), 35);
    let glyph = &vm.memory()[35..40];
    assert_eq!(glyph, &[0xF0, 0x10, 0x20, 0x40, 0x40]);
}

#[test]
fn test_add_to_index_overflow_flag() {
    let mut vm = boot(&[
        0x60, 0xFF, // V0 = 255
        0xAF, 0xFF, // I = 0xFFF
        0xF0, 0x1E, // I += V0
        0x12, 0x04, // jump back to the add
    ]);
    vm.tick().unwrap();
    vm.tick().unwrap();

    let mut adds = 0;
    loop {
        vm.tick().unwrap(); // the add
        adds += 1;
        if vm.registers()[0xF] == 1 {
            break;
        }
        assert!(adds < 1000, "overflow flag never raised");
        vm.tick().unwrap(); // the jump
    }
    assert_eq!(adds, 241);
    assert_eq!(vm.index(), 14, "index wrapped around the address range");
}

#[test]
fn test_unknown_opcode_is_fatal_and_mutates_nothing() {
    let mut vm = boot(&[0x61, 0x05, 0xF1, 0x15, 0xFF, 0xFF]);
    vm.tick().unwrap();
    vm.tick().unwrap();
    let pc_before = vm.pc();
    let registers_before = *vm.registers();
    let delay_before = vm.delay_timer();

    assert_eq!(vm.tick(), Err(TickError::UnknownOpcode(0xFFFF)));
    assert_eq!(vm.pc(), pc_before);
    assert_eq!(*vm.registers(), registers_before);
    assert_eq!(vm.delay_timer(), delay_before);

    // The machine has no way to resume; ticking again just fails again.
    assert_eq!(vm.tick(), Err(TickError::UnknownOpcode(0xFFFF)));
}

#[test]
fn test_rom_size_gate() {
    let mut vm = VirtualMachine::new(0);
    let image = vec![0u8; ROM_CAPACITY + 1];
    assert!(matches!(
        vm.load_rom(&image),
        Err(RomError::TooLarge { size }) if size == ROM_CAPACITY + 1
    ));
    let image = vec![0u8; ROM_CAPACITY];
    assert!(vm.load_rom(&image).is_ok());
}

#[test]
fn test_timers_count_down_once_per_cycle() {
    let mut vm = boot(&[
        0x60, 0x03, 0xF0, 0x15, // delay = 3
        0x61, 0x00, 0x61, 0x00, 0x61, 0x00, 0x61, 0x00,
    ]);
    vm.tick().unwrap();
    vm.tick().unwrap();
    let mut expected = 2;
    assert_eq!(vm.delay_timer(), expected);
    for _ in 0..4 {
        vm.tick().unwrap();
        expected = expected.saturating_sub(1);
        assert_eq!(vm.delay_timer(), expected);
    }
}

#[test]
fn test_random_is_reproducible_per_seed() {
    let mut a = VirtualMachine::new(9);
    let mut b = VirtualMachine::new(9);
    a.load_rom(&[0xC0, 0xFF]).unwrap();
    b.load_rom(&[0xC0, 0xFF]).unwrap();
    a.tick().unwrap();
    b.tick().unwrap();
    assert_eq!(a.registers()[0], b.registers()[0]);
}

#[test]
fn test_draw_wraps_horizontally() {
    // Glyph 0 drawn with its left edge two pixels from the right border.
    let mut vm = boot(&[0x60, 0x3E, 0xD0, 0x15]);
    vm.tick().unwrap();
    vm.tick().unwrap();
    let top = &vm.framebuffer()[..SCREEN_WIDTH];
    assert!(top[62] && top[63] && top[0] && top[1]);
    assert!(!top[2]);
}
