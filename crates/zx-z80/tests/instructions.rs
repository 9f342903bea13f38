//! Instruction-level tests: decode, documented tact costs, flags, and
//! interrupt behaviour, all against a flat 64K test bus.

use zx_core::Bus;
use zx_z80::flags::{CF, HF, NF, PF, SF, XF, YF, ZF};
use zx_z80::{Z80, disasm};

/// Flat 64K RAM, unit port latch, no contention.
struct FlatBus {
    memory: Box<[u8; 0x10000]>,
    port_in: u8,
    last_port_write: Option<(u16, u8)>,
}

impl FlatBus {
    fn new() -> Self {
        Self {
            memory: Box::new([0; 0x10000]),
            port_in: 0xFF,
            last_port_write: None,
        }
    }

    fn load(&mut self, addr: u16, bytes: &[u8]) {
        for (i, &b) in bytes.iter().enumerate() {
            self.memory[addr.wrapping_add(i as u16) as usize] = b;
        }
    }
}

impl Bus for FlatBus {
    fn read(&mut self, addr: u16) -> u8 {
        self.memory[addr as usize]
    }

    fn write(&mut self, addr: u16, value: u8) {
        self.memory[addr as usize] = value;
    }

    fn read_port(&mut self, _port: u16, _tact: u64) -> u8 {
        self.port_in
    }

    fn write_port(&mut self, port: u16, value: u8, _tact: u64) {
        self.last_port_write = Some((port, value));
    }
}

/// Run one instruction from the given bytes at $8000; returns (cpu, bus).
fn exec(bytes: &[u8]) -> (Z80, FlatBus) {
    let mut cpu = Z80::new();
    let mut bus = FlatBus::new();
    cpu.regs.pc = 0x8000;
    cpu.regs.f = 0;
    bus.load(0x8000, bytes);
    cpu.step(&mut bus);
    (cpu, bus)
}

/// Tact cost of a single instruction from reset at $8000.
fn cost(bytes: &[u8]) -> u64 {
    let (cpu, _) = exec(bytes);
    cpu.tacts().get()
}

#[test]
fn documented_costs_unprefixed() {
    assert_eq!(cost(&[0x00]), 4); // NOP
    assert_eq!(cost(&[0x01, 0x34, 0x12]), 10); // LD BC,nn
    assert_eq!(cost(&[0x03]), 6); // INC BC
    assert_eq!(cost(&[0x04]), 4); // INC B
    assert_eq!(cost(&[0x06, 0x42]), 7); // LD B,n
    assert_eq!(cost(&[0x09]), 11); // ADD HL,BC
    assert_eq!(cost(&[0x22, 0x00, 0x90]), 16); // LD (nn),HL
    assert_eq!(cost(&[0x2A, 0x00, 0x90]), 16); // LD HL,(nn)
    assert_eq!(cost(&[0x32, 0x00, 0x90]), 13); // LD (nn),A
    assert_eq!(cost(&[0x34]), 11); // INC (HL)
    assert_eq!(cost(&[0x36, 0x55]), 10); // LD (HL),n
    assert_eq!(cost(&[0x41]), 4); // LD B,C
    assert_eq!(cost(&[0x46]), 7); // LD B,(HL)
    assert_eq!(cost(&[0x70]), 7); // LD (HL),B
    assert_eq!(cost(&[0x80]), 4); // ADD A,B
    assert_eq!(cost(&[0x86]), 7); // ADD A,(HL)
    assert_eq!(cost(&[0xC3, 0x00, 0x40]), 10); // JP nn
    assert_eq!(cost(&[0xC5]), 11); // PUSH BC
    assert_eq!(cost(&[0xC1]), 10); // POP BC
    assert_eq!(cost(&[0xCD, 0x00, 0x40]), 17); // CALL nn
    assert_eq!(cost(&[0xC9]), 10); // RET
    assert_eq!(cost(&[0xC7]), 11); // RST 00
    assert_eq!(cost(&[0xD3, 0xFE]), 11); // OUT (n),A
    assert_eq!(cost(&[0xDB, 0xFE]), 11); // IN A,(n)
    assert_eq!(cost(&[0xE3]), 19); // EX (SP),HL
    assert_eq!(cost(&[0xE9]), 4); // JP (HL)
    assert_eq!(cost(&[0xF9]), 6); // LD SP,HL
}

#[test]
fn conditional_costs_depend_on_outcome() {
    // JR taken 12, not taken 7 (Z clear after reset in exec())
    assert_eq!(cost(&[0x20, 0x10]), 12); // JR NZ taken
    assert_eq!(cost(&[0x28, 0x10]), 7); // JR Z not taken

    // DJNZ: B=0 wraps to FF -> taken (13); B=1 -> not taken (8)
    let mut cpu = Z80::new();
    let mut bus = FlatBus::new();
    cpu.regs.pc = 0x8000;
    cpu.regs.b = 2;
    bus.load(0x8000, &[0x10, 0xFE]);
    cpu.step(&mut bus);
    assert_eq!(cpu.tacts().get(), 13);
    assert_eq!(cpu.regs.pc, 0x8000);

    cpu.regs.b = 1;
    let before = cpu.tacts().get();
    cpu.step(&mut bus);
    assert_eq!(cpu.tacts().get() - before, 8);

    // RET cc / CALL cc
    assert_eq!(cost(&[0xC0]), 11); // RET NZ taken
    assert_eq!(cost(&[0xC8]), 5); // RET Z not taken
    assert_eq!(cost(&[0xC4, 0x00, 0x40]), 17); // CALL NZ taken
    assert_eq!(cost(&[0xCC, 0x00, 0x40]), 10); // CALL Z not taken
}

#[test]
fn documented_costs_prefixed() {
    assert_eq!(cost(&[0xCB, 0x00]), 8); // RLC B
    assert_eq!(cost(&[0xCB, 0x06]), 15); // RLC (HL)
    assert_eq!(cost(&[0xCB, 0x46]), 12); // BIT 0,(HL)
    assert_eq!(cost(&[0xCB, 0xC6]), 15); // SET 0,(HL)
    assert_eq!(cost(&[0xED, 0x44]), 8); // NEG
    assert_eq!(cost(&[0xED, 0x47]), 9); // LD I,A
    assert_eq!(cost(&[0xED, 0x52]), 15); // SBC HL,DE
    assert_eq!(cost(&[0xED, 0x43, 0x00, 0x90]), 20); // LD (nn),BC
    assert_eq!(cost(&[0xED, 0x45]), 14); // RETN
    assert_eq!(cost(&[0xED, 0x78]), 12); // IN A,(C)
    assert_eq!(cost(&[0xED, 0x67]), 18); // RRD
    assert_eq!(cost(&[0xED, 0xA0]), 16); // LDI
    assert_eq!(cost(&[0xED, 0xA1]), 16); // CPI
    assert_eq!(cost(&[0xED, 0xA2]), 16); // INI
    assert_eq!(cost(&[0xED, 0xA3]), 16); // OUTI
    assert_eq!(cost(&[0xED, 0x00]), 8); // unassigned ED = NOP
    assert_eq!(cost(&[0xDD, 0x21, 0x34, 0x12]), 14); // LD IX,nn
    assert_eq!(cost(&[0xFD, 0x21, 0x34, 0x12]), 14); // LD IY,nn
    assert_eq!(cost(&[0xDD, 0x09]), 15); // ADD IX,BC
    assert_eq!(cost(&[0xDD, 0x23]), 10); // INC IX
    assert_eq!(cost(&[0xDD, 0x24]), 8); // INC IXH
    assert_eq!(cost(&[0xDD, 0x7E, 0x05]), 19); // LD A,(IX+d)
    assert_eq!(cost(&[0xDD, 0x36, 0x05, 0xAA]), 19); // LD (IX+d),n
    assert_eq!(cost(&[0xDD, 0x34, 0x05]), 23); // INC (IX+d)
    assert_eq!(cost(&[0xDD, 0xE5]), 15); // PUSH IX
    assert_eq!(cost(&[0xDD, 0xE1]), 14); // POP IX
    assert_eq!(cost(&[0xDD, 0xE9]), 8); // JP (IX)
    assert_eq!(cost(&[0xDD, 0xCB, 0x05, 0x46]), 20); // BIT 0,(IX+d)
    assert_eq!(cost(&[0xDD, 0xCB, 0x05, 0xC6]), 23); // SET 0,(IX+d)
    assert_eq!(cost(&[0xDD, 0x41]), 8); // inert prefix + LD B,C
}

#[test]
fn decode_and_cost_pin_the_examples() {
    // The two canonical sequences: CB 00 and FD 21 34 12
    let d = disasm::disassemble(&[0xCB, 0x00], 0);
    assert_eq!(d.text, "RLC B");
    assert_eq!(cost(&[0xCB, 0x00]), 8);

    let d = disasm::disassemble(&[0xFD, 0x21, 0x34, 0x12], 0);
    assert_eq!(d.text, "LD IY,$1234");
    let (cpu, _) = exec(&[0xFD, 0x21, 0x34, 0x12]);
    assert_eq!(cpu.regs.iy, 0x1234);
    assert_eq!(cpu.tacts().get(), 14);
}

#[test]
fn loads_and_stores() {
    let (cpu, _) = exec(&[0x01, 0x34, 0x12]);
    assert_eq!(cpu.regs.bc(), 0x1234);

    let mut cpu = Z80::new();
    let mut bus = FlatBus::new();
    cpu.regs.pc = 0x8000;
    cpu.regs.a = 0x5A;
    bus.load(0x8000, &[0x32, 0x00, 0x90]); // LD (nn),A
    cpu.step(&mut bus);
    assert_eq!(bus.memory[0x9000], 0x5A);
    // WZ = (nn+1) low | A high
    assert_eq!(cpu.regs.wz, 0x5A01);

    bus.load(0x9100, &[0xCD]);
    cpu.regs.pc = 0x8010;
    bus.load(0x8010, &[0x3A, 0x00, 0x91]); // LD A,(nn)
    cpu.step(&mut bus);
    assert_eq!(cpu.regs.a, 0xCD);
    assert_eq!(cpu.regs.wz, 0x9101);
}

#[test]
fn stack_round_trip() {
    let mut cpu = Z80::new();
    let mut bus = FlatBus::new();
    cpu.regs.pc = 0x8000;
    cpu.regs.sp = 0xFFF0;
    cpu.regs.set_bc(0xBEEF);
    bus.load(0x8000, &[0xC5, 0xD1]); // PUSH BC; POP DE
    cpu.step(&mut bus);
    assert_eq!(cpu.regs.sp, 0xFFEE);
    cpu.step(&mut bus);
    assert_eq!(cpu.regs.sp, 0xFFF0);
    assert_eq!(cpu.regs.de(), 0xBEEF);
}

#[test]
fn call_pushes_return_address() {
    let mut cpu = Z80::new();
    let mut bus = FlatBus::new();
    cpu.regs.pc = 0x8000;
    cpu.regs.sp = 0xFFF0;
    bus.load(0x8000, &[0xCD, 0x00, 0x40]); // CALL $4000
    cpu.step(&mut bus);
    assert_eq!(cpu.regs.pc, 0x4000);
    assert_eq!(cpu.regs.sp, 0xFFEE);
    assert_eq!(bus.memory[0xFFEE], 0x03); // return address $8003
    assert_eq!(bus.memory[0xFFEF], 0x80);

    bus.load(0x4000, &[0xC9]); // RET
    cpu.step(&mut bus);
    assert_eq!(cpu.regs.pc, 0x8003);
    assert_eq!(cpu.regs.sp, 0xFFF0);
}

#[test]
fn addition_flag_truth_table_samples() {
    let cases: &[(u8, u8, u8)] = &[
        // a, operand, expected F for ADD A,n with no carry in
        (0x00, 0x00, ZF),          // 0+0: Z only
        (0x0F, 0x01, HF),          // half carry
        (0x7F, 0x01, SF | HF | PF), // overflow into 0x80
        (0xFF, 0x01, ZF | HF | CF), // full wrap
        (0x80, 0x80, ZF | PF | CF), // negative overflow
        (0x27, 0x01, YF | XF),     // undocumented copies of bits 5,3 of 0x28
    ];
    for &(a, n, expected) in cases {
        let mut cpu = Z80::new();
        let mut bus = FlatBus::new();
        cpu.regs.pc = 0x8000;
        cpu.regs.a = a;
        cpu.regs.f = 0;
        bus.load(0x8000, &[0xC6, n]); // ADD A,n
        cpu.step(&mut bus);
        assert_eq!(
            cpu.regs.f, expected,
            "ADD A: {a:#04X}+{n:#04X} flags {:#010b} != {expected:#010b}",
            cpu.regs.f
        );
    }
}

#[test]
fn compare_takes_xy_from_operand() {
    let mut cpu = Z80::new();
    let mut bus = FlatBus::new();
    cpu.regs.pc = 0x8000;
    cpu.regs.a = 0x50;
    bus.load(0x8000, &[0xFE, 0x28]); // CP $28
    cpu.step(&mut bus);
    assert_ne!(cpu.regs.f & YF, 0);
    assert_ne!(cpu.regs.f & XF, 0);
    assert_eq!(cpu.regs.a, 0x50, "CP must not store the result");
}

#[test]
fn scf_ccf_undocumented_bits() {
    // After an instruction that set flags (Q nonzero), SCF takes X/Y from A
    let mut cpu = Z80::new();
    let mut bus = FlatBus::new();
    cpu.regs.pc = 0x8000;
    cpu.regs.a = 0x00;
    bus.load(0x8000, &[0xA7, 0x37]); // AND A (sets Q); SCF
    cpu.step(&mut bus);
    cpu.step(&mut bus);
    assert_ne!(cpu.regs.f & CF, 0);
    assert_eq!(cpu.regs.f & (YF | XF), 0, "A=0, Q=F: X/Y clear");

    // CCF after SCF: carry inverts, H gets the old carry
    bus.load(0x8002, &[0x3F]);
    cpu.step(&mut bus);
    assert_eq!(cpu.regs.f & CF, 0);
    assert_ne!(cpu.regs.f & HF, 0);
}

#[test]
fn bit_hl_leaks_wz_high() {
    let mut cpu = Z80::new();
    let mut bus = FlatBus::new();
    cpu.regs.pc = 0x8000;
    cpu.regs.set_hl(0x9000);
    cpu.regs.wz = 0x2800; // high byte has bits 5,3 set
    bus.memory[0x9000] = 0xFF;
    bus.load(0x8000, &[0xCB, 0x46]); // BIT 0,(HL)
    cpu.step(&mut bus);
    assert_ne!(cpu.regs.f & YF, 0);
    assert_ne!(cpu.regs.f & XF, 0);
}

#[test]
fn block_transfer() {
    let mut cpu = Z80::new();
    let mut bus = FlatBus::new();
    cpu.regs.pc = 0x8000;
    cpu.regs.set_hl(0x9000);
    cpu.regs.set_de(0xA000);
    cpu.regs.set_bc(3);
    bus.load(0x9000, &[0x11, 0x22, 0x33]);
    bus.load(0x8000, &[0xED, 0xB0]); // LDIR

    // First iteration repeats: 21 tacts
    cpu.step(&mut bus);
    assert_eq!(cpu.tacts().get(), 21);
    assert_eq!(cpu.regs.pc, 0x8000);
    assert_eq!(cpu.regs.bc(), 2);

    cpu.step(&mut bus);
    cpu.step(&mut bus); // final iteration: 16 tacts, falls through
    assert_eq!(cpu.tacts().get(), 21 + 21 + 16);
    assert_eq!(cpu.regs.pc, 0x8002);
    assert_eq!(cpu.regs.bc(), 0);
    assert_eq!(&bus.memory[0xA000..0xA003], &[0x11, 0x22, 0x33]);
    assert_eq!(cpu.regs.f & PF, 0, "P/V clear once BC reaches zero");
}

#[test]
fn halt_is_a_sink_until_interrupt() {
    let mut cpu = Z80::new();
    let mut bus = FlatBus::new();
    cpu.regs.pc = 0x8000;
    bus.load(0x8000, &[0x76]); // HALT
    cpu.step(&mut bus);
    assert!(cpu.is_halted());
    assert_eq!(cpu.tacts().get(), 4);

    // Halted steps advance the clock by the fixed quantum
    cpu.step(&mut bus);
    cpu.step(&mut bus);
    assert!(cpu.is_halted());
    assert_eq!(cpu.tacts().get(), 12);

    // Interrupts disabled: the INT line does nothing
    cpu.set_int(true);
    cpu.step(&mut bus);
    assert!(cpu.is_halted());

    // Enable via register poke and release
    cpu.regs.iff1 = true;
    cpu.step(&mut bus);
    assert!(!cpu.is_halted());
    assert!(cpu.int_acknowledged());
    assert_eq!(cpu.regs.pc, 0x0038, "IM 1 vectors to $0038");
}

#[test]
fn im1_interrupt_cost_and_stack() {
    let mut cpu = Z80::new();
    let mut bus = FlatBus::new();
    cpu.regs.pc = 0x8000;
    cpu.regs.sp = 0xFFF0;
    cpu.regs.iff1 = true;
    cpu.regs.iff2 = true;
    cpu.regs.im = 1;
    cpu.set_int(true);

    cpu.step(&mut bus);
    assert!(cpu.int_acknowledged());
    assert_eq!(cpu.tacts().get(), 13);
    assert_eq!(cpu.regs.pc, 0x0038);
    assert!(!cpu.regs.iff1 && !cpu.regs.iff2);
    assert_eq!(bus.memory[0xFFEE], 0x00);
    assert_eq!(bus.memory[0xFFEF], 0x80);
}

#[test]
fn im2_vector_fetch() {
    let mut cpu = Z80::new();
    let mut bus = FlatBus::new();
    cpu.regs.pc = 0x8000;
    cpu.regs.sp = 0xFFF0;
    cpu.regs.iff1 = true;
    cpu.regs.im = 2;
    cpu.regs.i = 0x3B;
    // Vector table entry at $3BFF (bus floats $FF)
    bus.load(0x3BFF, &[0x34, 0x12]);
    cpu.set_int(true);

    cpu.step(&mut bus);
    assert_eq!(cpu.tacts().get(), 19);
    assert_eq!(cpu.regs.pc, 0x1234);
}

#[test]
fn ei_delays_interrupt_by_one_instruction() {
    let mut cpu = Z80::new();
    let mut bus = FlatBus::new();
    cpu.regs.pc = 0x8000;
    cpu.regs.sp = 0xFFF0;
    cpu.regs.im = 1;
    bus.load(0x8000, &[0xFB, 0x00]); // EI; NOP
    cpu.set_int(true);

    cpu.step(&mut bus); // EI
    assert!(cpu.regs.iff1);
    cpu.step(&mut bus); // NOP executes despite pending INT
    assert!(!cpu.int_acknowledged());
    assert_eq!(cpu.regs.pc, 0x8002);

    cpu.step(&mut bus); // now the interrupt is taken
    assert!(cpu.int_acknowledged());
    assert_eq!(cpu.regs.pc, 0x0038);
}

#[test]
fn nmi_preserves_iff2() {
    let mut cpu = Z80::new();
    let mut bus = FlatBus::new();
    cpu.regs.pc = 0x8000;
    cpu.regs.sp = 0xFFF0;
    cpu.regs.iff1 = true;
    cpu.regs.iff2 = true;
    cpu.trigger_nmi();

    cpu.step(&mut bus);
    assert_eq!(cpu.tacts().get(), 11);
    assert_eq!(cpu.regs.pc, 0x0066);
    assert!(!cpu.regs.iff1);
    assert!(cpu.regs.iff2);

    // RETN restores IFF1 from IFF2
    bus.load(0x0066, &[0xED, 0x45]);
    cpu.step(&mut bus);
    assert!(cpu.regs.iff1);
    assert_eq!(cpu.regs.pc, 0x8000);
}

#[test]
fn refresh_register_counts_fetches() {
    let mut cpu = Z80::new();
    let mut bus = FlatBus::new();
    cpu.regs.pc = 0x8000;
    bus.load(0x8000, &[0x00, 0xCB, 0x00, 0xDD, 0x21, 0x34, 0x12]);
    cpu.step(&mut bus); // NOP: R += 1
    assert_eq!(cpu.regs.r, 1);
    cpu.step(&mut bus); // CB 00: two fetches
    assert_eq!(cpu.regs.r, 3);
    cpu.step(&mut bus); // DD 21: two fetches (operand bytes don't refresh)
    assert_eq!(cpu.regs.r, 5);
}

#[test]
fn undocumented_index_halves() {
    let mut cpu = Z80::new();
    let mut bus = FlatBus::new();
    cpu.regs.pc = 0x8000;
    cpu.regs.ix = 0x1234;
    bus.load(0x8000, &[0xDD, 0x24, 0xDD, 0x2E, 0x99, 0xDD, 0x7C]);
    cpu.step(&mut bus); // INC IXH
    assert_eq!(cpu.regs.ix, 0x1334);
    cpu.step(&mut bus); // LD IXL,$99
    assert_eq!(cpu.regs.ix, 0x1399);
    cpu.step(&mut bus); // LD A,IXH
    assert_eq!(cpu.regs.a, 0x13);
}

#[test]
fn indexed_cb_copies_to_register() {
    let mut cpu = Z80::new();
    let mut bus = FlatBus::new();
    cpu.regs.pc = 0x8000;
    cpu.regs.ix = 0x9000;
    bus.memory[0x9005] = 0x01;
    bus.load(0x8000, &[0xDD, 0xCB, 0x05, 0x00]); // RLC (IX+5),B
    cpu.step(&mut bus);
    assert_eq!(bus.memory[0x9005], 0x02);
    assert_eq!(cpu.regs.b, 0x02);
}

#[test]
fn out_in_port_roundtrip() {
    let mut cpu = Z80::new();
    let mut bus = FlatBus::new();
    cpu.regs.pc = 0x8000;
    cpu.regs.a = 0x12;
    bus.load(0x8000, &[0xD3, 0xFE]); // OUT ($FE),A
    cpu.step(&mut bus);
    assert_eq!(bus.last_port_write, Some((0x12FE, 0x12)));

    bus.port_in = 0x7E;
    bus.load(0x8002, &[0xDB, 0xFE]); // IN A,($FE)
    cpu.step(&mut bus);
    assert_eq!(cpu.regs.a, 0x7E);
}

#[test]
fn neg_and_daa() {
    let mut cpu = Z80::new();
    let mut bus = FlatBus::new();
    cpu.regs.pc = 0x8000;
    cpu.regs.a = 0x01;
    bus.load(0x8000, &[0xED, 0x44]); // NEG
    cpu.step(&mut bus);
    assert_eq!(cpu.regs.a, 0xFF);
    assert_ne!(cpu.regs.f & NF, 0);
    assert_ne!(cpu.regs.f & CF, 0);

    // 0x15 + 0x27 = 0x3C, DAA corrects to 0x42
    let mut cpu = Z80::new();
    let mut bus = FlatBus::new();
    cpu.regs.pc = 0x8000;
    cpu.regs.a = 0x15;
    bus.load(0x8000, &[0xC6, 0x27, 0x27]); // ADD A,$27; DAA
    cpu.step(&mut bus);
    cpu.step(&mut bus);
    assert_eq!(cpu.regs.a, 0x42);
}

#[test]
fn tact_clock_is_monotonic_and_reset_rewinds() {
    let mut cpu = Z80::new();
    let mut bus = FlatBus::new();
    cpu.regs.pc = 0x8000;
    bus.load(0x8000, &[0x00; 16]);
    let mut last = 0;
    for _ in 0..16 {
        cpu.step(&mut bus);
        assert!(cpu.tacts().get() > last);
        last = cpu.tacts().get();
    }
    cpu.reset();
    assert_eq!(cpu.tacts().get(), 0);
}
