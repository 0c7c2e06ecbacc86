use super::basics::{
    FONT_HEIGHT, FONT_SET, MEMORY_SIZE, NUM_KEYS, NUM_REGISTERS, OPCODE_SIZE, ROM_CAPACITY,
    ROM_START, SCREEN_HEIGHT, SCREEN_SIZE, SCREEN_WIDTH, STACK_DEPTH,
};
use super::program::Instruction;
use super::rom::RomError;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use thiserror::Error;

/// A fault that aborts the current cycle. The machine is left exactly as it
/// was before the cycle started; there is no defined way to resume from an
/// invalid instruction stream, so the caller is expected to stop ticking.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum TickError {
    #[error("unknown opcode {0:#06X}")]
    UnknownOpcode(u16),
    #[error("call stack overflow (more than {} nested calls)", STACK_DEPTH)]
    StackOverflow,
    #[error("return with an empty call stack")]
    StackUnderflow,
    #[error("program counter {0:#06X} outside addressable memory")]
    PcOutOfRange(u16),
}

/// How the program counter moves after an instruction.
#[derive(Debug, PartialEq, Eq)]
enum ProgramCounter {
    Next,
    Skip,
    Jump(u16),
    Hold,
}

fn skip_if(condition: bool) -> ProgramCounter {
    if condition {
        ProgramCounter::Skip
    } else {
        ProgramCounter::Next
    }
}

/// Whether the machine is executing instructions or parked on a key-wait.
///
/// The key-wait instruction never blocks a thread: while no key is down the
/// machine stays in `AwaitingKey` and every cycle just polls the pad again,
/// leaving the program counter in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Running,
    AwaitingKey { target: usize },
}

/// The whole machine: memory, register file, call stack, timers, framebuffer
/// and keypad, advanced one fetch-decode-execute cycle per [`tick`] call.
///
/// [`tick`]: VirtualMachine::tick
pub struct VirtualMachine {
    memory: [u8; MEMORY_SIZE],
    registers: [u8; NUM_REGISTERS],
    stack: Vec<u16>,
    pc: u16,
    index: u16,
    delay_timer: u8,
    sound_timer: u8,
    framebuffer: [bool; SCREEN_SIZE],
    keypad: [bool; NUM_KEYS],
    dirty: bool,
    mode: Mode,
    seed: u64,
    rng: StdRng,
}

impl VirtualMachine {
    /// Creates a freshly initialized machine. The seed fixes the stream of
    /// the random-value instruction, so equal seeds give equal runs.
    pub fn new(seed: u64) -> VirtualMachine {
        let mut vm = VirtualMachine {
            memory: [0; MEMORY_SIZE],
            registers: [0; NUM_REGISTERS],
            stack: Vec::with_capacity(STACK_DEPTH),
            pc: 0,
            index: 0,
            delay_timer: 0,
            sound_timer: 0,
            framebuffer: [false; SCREEN_SIZE],
            keypad: [false; NUM_KEYS],
            dirty: false,
            mode: Mode::Running,
            seed,
            rng: StdRng::seed_from_u64(seed),
        };
        vm.reset();
        vm
    }

    /// Zeroes every field, copies the font into low memory, points the
    /// program counter at the ROM area and re-seeds the random source.
    pub fn reset(&mut self) {
        self.memory = [0; MEMORY_SIZE];
        self.memory[..FONT_SET.len()].copy_from_slice(&FONT_SET);
        self.registers = [0; NUM_REGISTERS];
        self.stack.clear();
        self.pc = ROM_START as u16;
        self.index = 0;
        self.delay_timer = 0;
        self.sound_timer = 0;
        self.framebuffer = [false; SCREEN_SIZE];
        self.keypad = [false; NUM_KEYS];
        self.dirty = false;
        self.mode = Mode::Running;
        self.rng = StdRng::seed_from_u64(self.seed);
    }

    /// Resets the machine and copies a ROM image to address 0x200. Oversized
    /// images are rejected before any byte is copied. The instruction stream
    /// itself is not validated.
    pub fn load_rom(&mut self, bytes: &[u8]) -> Result<(), RomError> {
        self.reset();
        if bytes.len() > ROM_CAPACITY {
            return Err(RomError::TooLarge { size: bytes.len() });
        }
        self.memory[ROM_START..ROM_START + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    /// Runs one machine cycle: fetch, decode, execute, then count both
    /// timers down by one if they are above zero. A cycle spent waiting for
    /// a key skips fetch and decode but still counts the timers down.
    pub fn tick(&mut self) -> Result<(), TickError> {
        if let Mode::AwaitingKey { target } = self.mode {
            if let Some(key) = self.pressed_key() {
                self.registers[target] = key;
                self.pc = self.pc.wrapping_add(OPCODE_SIZE);
                self.mode = Mode::Running;
            }
            self.step_timers();
            return Ok(());
        }

        let opcode = self.fetch()?;
        let instruction =
            Instruction::decode(opcode).ok_or(TickError::UnknownOpcode(opcode))?;
        match self.execute(&instruction)? {
            ProgramCounter::Next => self.pc = self.pc.wrapping_add(OPCODE_SIZE),
            ProgramCounter::Skip => self.pc = self.pc.wrapping_add(OPCODE_SIZE * 2),
            ProgramCounter::Jump(addr) => self.pc = addr,
            ProgramCounter::Hold => {}
        }
        self.step_timers();
        Ok(())
    }

    /// Reads the big-endian opcode word at the program counter.
    fn fetch(&self) -> Result<u16, TickError> {
        let pc = self.pc as usize;
        if pc + 2 > MEMORY_SIZE {
            return Err(TickError::PcOutOfRange(self.pc));
        }
        Ok(u16::from(self.memory[pc]) << 8 | u16::from(self.memory[pc + 1]))
    }

    fn step_timers(&mut self) {
        if self.delay_timer > 0 {
            self.delay_timer -= 1;
        }
        if self.sound_timer > 0 {
            self.sound_timer -= 1;
        }
    }

    /// Scans the pad in ascending order; when several keys are down the
    /// highest index wins.
    fn pressed_key(&self) -> Option<u8> {
        let mut pressed = None;
        for (key, down) in self.keypad.iter().enumerate() {
            if *down {
                pressed = Some(key as u8);
            }
        }
        pressed
    }

    /// Applies one instruction to the machine and reports how the program
    /// counter moves. Flag writes to V[0xF] happen after the result write,
    /// so the flag survives when the destination register is V[0xF] itself.
    fn execute(&mut self, instruction: &Instruction) -> Result<ProgramCounter, TickError> {
        let next = match *instruction {
            Instruction::ClearScreen => {
                self.framebuffer = [false; SCREEN_SIZE];
                self.dirty = true;
                ProgramCounter::Next
            }
            Instruction::Return => {
                let caller = self.stack.pop().ok_or(TickError::StackUnderflow)?;
                ProgramCounter::Jump(caller.wrapping_add(OPCODE_SIZE))
            }
            Instruction::Jump(nnn) => ProgramCounter::Jump(nnn),
            Instruction::Call(nnn) => {
                if self.stack.len() == STACK_DEPTH {
                    return Err(TickError::StackOverflow);
                }
                self.stack.push(self.pc);
                ProgramCounter::Jump(nnn)
            }
            Instruction::SkipEqualConst(x, nn) => skip_if(self.registers[x] == nn),
            Instruction::SkipNotEqualConst(x, nn) => skip_if(self.registers[x] != nn),
            Instruction::SkipEqual(x, y) => skip_if(self.registers[x] == self.registers[y]),
            Instruction::SkipNotEqual(x, y) => skip_if(self.registers[x] != self.registers[y]),
            Instruction::SetConst(x, nn) => {
                self.registers[x] = nn;
                ProgramCounter::Next
            }
            Instruction::AddConst(x, nn) => {
                self.registers[x] = self.registers[x].wrapping_add(nn);
                ProgramCounter::Next
            }
            Instruction::Set(x, y) => {
                self.registers[x] = self.registers[y];
                ProgramCounter::Next
            }
            Instruction::Or(x, y) => {
                self.registers[x] |= self.registers[y];
                ProgramCounter::Next
            }
            Instruction::And(x, y) => {
                self.registers[x] &= self.registers[y];
                ProgramCounter::Next
            }
            Instruction::Xor(x, y) => {
                self.registers[x] ^= self.registers[y];
                ProgramCounter::Next
            }
            Instruction::Add(x, y) => {
                let (sum, carry) = self.registers[x].overflowing_add(self.registers[y]);
                self.registers[x] = sum;
                self.registers[0xF] = carry as u8;
                ProgramCounter::Next
            }
            Instruction::Sub(x, y) => {
                let vx = self.registers[x];
                let vy = self.registers[y];
                self.registers[x] = vx.wrapping_sub(vy);
                self.registers[0xF] = (vy <= vx) as u8;
                ProgramCounter::Next
            }
            Instruction::SubInv(x, y) => {
                let vx = self.registers[x];
                let vy = self.registers[y];
                self.registers[x] = vy.wrapping_sub(vx);
                self.registers[0xF] = (vx <= vy) as u8;
                ProgramCounter::Next
            }
            Instruction::RightShift(x) => {
                let vx = self.registers[x];
                self.registers[x] = vx >> 1;
                self.registers[0xF] = vx & 0x01;
                ProgramCounter::Next
            }
            Instruction::LeftShift(x) => {
                let vx = self.registers[x];
                self.registers[x] = vx << 1;
                self.registers[0xF] = vx >> 7;
                ProgramCounter::Next
            }
            Instruction::SetIndex(nnn) => {
                self.index = nnn;
                ProgramCounter::Next
            }
            Instruction::JumpOffset(nnn) => {
                ProgramCounter::Jump(nnn.wrapping_add(u16::from(self.registers[0])))
            }
            Instruction::Rand(x, nn) => {
                self.registers[x] = self.rng.gen::<u8>() & nn;
                ProgramCounter::Next
            }
            Instruction::Draw(x, y, n) => {
                let collision = self.draw_sprite(self.registers[x], self.registers[y], n);
                self.registers[0xF] = collision as u8;
                ProgramCounter::Next
            }
            Instruction::SkipKeyPressed(x) => {
                skip_if(self.keypad[(self.registers[x] & 0x0F) as usize])
            }
            Instruction::SkipKeyNotPressed(x) => {
                skip_if(!self.keypad[(self.registers[x] & 0x0F) as usize])
            }
            Instruction::GetDelayTimer(x) => {
                self.registers[x] = self.delay_timer;
                ProgramCounter::Next
            }
            Instruction::WaitKey(x) => match self.pressed_key() {
                Some(key) => {
                    self.registers[x] = key;
                    ProgramCounter::Next
                }
                None => {
                    self.mode = Mode::AwaitingKey { target: x };
                    ProgramCounter::Hold
                }
            },
            Instruction::SetDelayTimer(x) => {
                self.delay_timer = self.registers[x];
                ProgramCounter::Next
            }
            Instruction::SetSoundTimer(x) => {
                self.sound_timer = self.registers[x];
                ProgramCounter::Next
            }
            Instruction::AddToIndex(x) => {
                let (sum, overflow) = self.index.overflowing_add(u16::from(self.registers[x]));
                self.index = sum;
                self.registers[0xF] = overflow as u8;
                ProgramCounter::Next
            }
            Instruction::FontAddr(x) => {
                self.index = u16::from(self.registers[x]) * FONT_HEIGHT as u16;
                ProgramCounter::Next
            }
            Instruction::StoreDecimal(x) => {
                let value = self.registers[x];
                let base = self.index as usize;
                self.memory[base % MEMORY_SIZE] = value / 100;
                self.memory[(base + 1) % MEMORY_SIZE] = value / 10 % 10;
                self.memory[(base + 2) % MEMORY_SIZE] = value % 10;
                ProgramCounter::Next
            }
            Instruction::StoreRegisters(x) => {
                let base = self.index as usize;
                for offset in 0..=x {
                    self.memory[(base + offset) % MEMORY_SIZE] = self.registers[offset];
                }
                self.index = self.index.wrapping_add(x as u16 + 1);
                ProgramCounter::Next
            }
            Instruction::LoadRegisters(x) => {
                let base = self.index as usize;
                for offset in 0..=x {
                    self.registers[offset] = self.memory[(base + offset) % MEMORY_SIZE];
                }
                self.index = self.index.wrapping_add(x as u16 + 1);
                ProgramCounter::Next
            }
        };
        Ok(next)
    }

    /// XOR-draws an 8-pixel-wide sprite read from memory at the index
    /// register. Coordinates wrap on both axes. Returns whether any lit
    /// sprite bit landed on an already lit pixel.
    fn draw_sprite(&mut self, origin_x: u8, origin_y: u8, height: u8) -> bool {
        let mut collision = false;
        for row in 0..height as usize {
            let bits = self.memory[(self.index as usize + row) % MEMORY_SIZE];
            for col in 0..8 {
                let lit = (bits >> (7 - col)) & 1 == 1;
                let px = (origin_x as usize + col) % SCREEN_WIDTH;
                let py = (origin_y as usize + row) % SCREEN_HEIGHT;
                let pixel = &mut self.framebuffer[py * SCREEN_WIDTH + px];
                collision |= *pixel && lit;
                *pixel ^= lit;
            }
        }
        self.dirty = true;
        collision
    }

    /// Row-major 64x32 pixel grid.
    pub fn framebuffer(&self) -> &[bool] {
        &self.framebuffer
    }

    /// Whether the framebuffer changed since [`clear_dirty`] was last called.
    ///
    /// [`clear_dirty`]: VirtualMachine::clear_dirty
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn clear_dirty(&mut self) {
        self.dirty = false;
    }

    /// Records a pad key going down or up. Called by the input layer between
    /// cycles; the machine only ever reads the pad.
    pub fn set_key(&mut self, key: u8, pressed: bool) {
        self.keypad[(key & 0x0F) as usize] = pressed;
    }

    pub fn pc(&self) -> u16 {
        self.pc
    }

    pub fn registers(&self) -> &[u8; NUM_REGISTERS] {
        &self.registers
    }

    pub fn index(&self) -> u16 {
        self.index
    }

    pub fn delay_timer(&self) -> u8 {
        self.delay_timer
    }

    pub fn sound_timer(&self) -> u8 {
        self.sound_timer
    }

    pub fn memory(&self) -> &[u8] {
        &self.memory
    }

    /// Renders the framebuffer as text, one `@` per lit pixel.
    pub fn render_ascii(&self) -> String {
        let mut out = String::with_capacity(SCREEN_SIZE + SCREEN_HEIGHT);
        for y in 0..SCREEN_HEIGHT {
            for x in 0..SCREEN_WIDTH {
                out.push(if self.framebuffer[y * SCREEN_WIDTH + x] {
                    '@'
                } else {
                    ' '
                });
            }
            out.push('\n');
        }
        out
    }
}
