//! Instruction execution: the four decode layers.
//!
//! Layer 1 is the plain opcode space, layer 2 the CB bit-operation prefix,
//! layer 3 the ED extended prefix, layer 4 the DD/FD index prefixes (which
//! may chain into the DD CB / FD CB sub-prefix). Every layer covers its
//! whole 256-entry space: unassigned ED opcodes execute as 8-tact no-ops
//! and a DD/FD prefix with no indexed meaning falls through to the
//! unprefixed handler, exactly as the silicon behaves.

use zx_core::Bus;

use crate::alu;
use crate::flags::{CF, HF, NF, PF, SF, XF, YF, ZF, sz53, sz53p};

use super::{IndexReg, Z80};

impl Z80 {
    // =======================================================================
    // Layer 1: unprefixed opcodes
    // =======================================================================

    /// Execute one already-fetched unprefixed opcode.
    pub(super) fn execute<B: Bus>(&mut self, bus: &mut B, op: u8) {
        match op {
            // NOP
            0x00 => {}

            // LD rr, nn
            0x01 | 0x11 | 0x21 | 0x31 => {
                let value = self.imm16(bus);
                self.set_rp(op >> 4, value);
            }

            // LD (BC), A
            0x02 => {
                let addr = self.regs.bc();
                self.regs.wz =
                    (u16::from(self.regs.a) << 8) | (addr.wrapping_add(1) & 0x00FF);
                let a = self.regs.a;
                self.mem_write(bus, addr, a);
            }

            // INC rr
            0x03 | 0x13 | 0x23 | 0x33 => {
                self.internal(2);
                let rp = op >> 4;
                let value = self.get_rp(rp).wrapping_add(1);
                self.set_rp(rp, value);
            }

            // INC r
            0x04 | 0x0C | 0x14 | 0x1C | 0x24 | 0x2C | 0x3C => {
                let r = (op >> 3) & 7;
                let result = alu::inc8(self.get_reg8(r));
                self.set_reg8(r, result.value);
                self.set_f((self.regs.f & CF) | result.flags);
            }

            // DEC r
            0x05 | 0x0D | 0x15 | 0x1D | 0x25 | 0x2D | 0x3D => {
                let r = (op >> 3) & 7;
                let result = alu::dec8(self.get_reg8(r));
                self.set_reg8(r, result.value);
                self.set_f((self.regs.f & CF) | result.flags);
            }

            // LD r, n
            0x06 | 0x0E | 0x16 | 0x1E | 0x26 | 0x2E | 0x3E => {
                let value = self.imm8(bus);
                self.set_reg8((op >> 3) & 7, value);
            }

            // RLCA
            0x07 => {
                let carry = self.regs.a >> 7;
                self.regs.a = self.regs.a.rotate_left(1);
                self.set_f(
                    (self.regs.f & (SF | ZF | PF))
                        | (self.regs.a & (YF | XF))
                        | if carry != 0 { CF } else { 0 },
                );
            }

            // EX AF, AF'
            0x08 => self.regs.exchange_af(),

            // ADD HL, rr
            0x09 | 0x19 | 0x29 | 0x39 => {
                self.internal(7);
                let hl = self.regs.hl();
                self.regs.wz = hl.wrapping_add(1);
                let (value, flags) = alu::add16(hl, self.get_rp(op >> 4));
                self.regs.set_hl(value);
                self.set_f((self.regs.f & (SF | ZF | PF)) | flags);
            }

            // LD A, (BC)
            0x0A => {
                let addr = self.regs.bc();
                self.regs.wz = addr.wrapping_add(1);
                self.regs.a = self.mem_read(bus, addr);
            }

            // DEC rr
            0x0B | 0x1B | 0x2B | 0x3B => {
                self.internal(2);
                let rp = op >> 4;
                let value = self.get_rp(rp).wrapping_sub(1);
                self.set_rp(rp, value);
            }

            // RRCA
            0x0F => {
                let carry = self.regs.a & 1;
                self.regs.a = self.regs.a.rotate_right(1);
                self.set_f(
                    (self.regs.f & (SF | ZF | PF))
                        | (self.regs.a & (YF | XF))
                        | if carry != 0 { CF } else { 0 },
                );
            }

            // DJNZ e
            0x10 => {
                self.internal(1);
                let offset = self.imm8(bus) as i8;
                self.regs.b = self.regs.b.wrapping_sub(1);
                if self.regs.b != 0 {
                    self.internal(5);
                    self.regs.pc = self.regs.pc.wrapping_add(offset as u16);
                    self.regs.wz = self.regs.pc;
                }
            }

            // LD (DE), A
            0x12 => {
                let addr = self.regs.de();
                self.regs.wz =
                    (u16::from(self.regs.a) << 8) | (addr.wrapping_add(1) & 0x00FF);
                let a = self.regs.a;
                self.mem_write(bus, addr, a);
            }

            // RLA
            0x17 => {
                let old_carry = self.regs.f & CF;
                let new_carry = self.regs.a >> 7;
                self.regs.a = (self.regs.a << 1) | old_carry;
                self.set_f(
                    (self.regs.f & (SF | ZF | PF))
                        | (self.regs.a & (YF | XF))
                        | if new_carry != 0 { CF } else { 0 },
                );
            }

            // JR e
            0x18 => {
                let offset = self.imm8(bus) as i8;
                self.internal(5);
                self.regs.pc = self.regs.pc.wrapping_add(offset as u16);
                self.regs.wz = self.regs.pc;
            }

            // LD A, (DE)
            0x1A => {
                let addr = self.regs.de();
                self.regs.wz = addr.wrapping_add(1);
                self.regs.a = self.mem_read(bus, addr);
            }

            // RRA
            0x1F => {
                let old_carry = (self.regs.f & CF) << 7;
                let new_carry = self.regs.a & 1;
                self.regs.a = (self.regs.a >> 1) | old_carry;
                self.set_f(
                    (self.regs.f & (SF | ZF | PF))
                        | (self.regs.a & (YF | XF))
                        | if new_carry != 0 { CF } else { 0 },
                );
            }

            // JR cc, e
            0x20 | 0x28 | 0x30 | 0x38 => {
                let offset = self.imm8(bus) as i8;
                // cc here is only NZ/Z/NC/C
                if self.condition((op >> 3) & 3) {
                    self.internal(5);
                    self.regs.pc = self.regs.pc.wrapping_add(offset as u16);
                    self.regs.wz = self.regs.pc;
                }
            }

            // LD (nn), HL
            0x22 => {
                let addr = self.imm16(bus);
                self.regs.wz = addr.wrapping_add(1);
                let (l, h) = (self.regs.l, self.regs.h);
                self.mem_write(bus, addr, l);
                self.mem_write(bus, addr.wrapping_add(1), h);
            }

            // DAA
            0x27 => self.daa(),

            // LD HL, (nn)
            0x2A => {
                let addr = self.imm16(bus);
                self.regs.wz = addr.wrapping_add(1);
                self.regs.l = self.mem_read(bus, addr);
                self.regs.h = self.mem_read(bus, addr.wrapping_add(1));
            }

            // CPL
            0x2F => {
                self.regs.a = !self.regs.a;
                self.set_f(
                    (self.regs.f & (SF | ZF | PF | CF))
                        | HF
                        | NF
                        | (self.regs.a & (YF | XF)),
                );
            }

            // LD (nn), A
            0x32 => {
                let addr = self.imm16(bus);
                self.regs.wz =
                    (u16::from(self.regs.a) << 8) | (addr.wrapping_add(1) & 0x00FF);
                let a = self.regs.a;
                self.mem_write(bus, addr, a);
            }

            // INC (HL)
            0x34 => {
                let addr = self.regs.hl();
                let result = alu::inc8(self.mem_read(bus, addr));
                self.internal(1);
                self.mem_write(bus, addr, result.value);
                self.set_f((self.regs.f & CF) | result.flags);
            }

            // DEC (HL)
            0x35 => {
                let addr = self.regs.hl();
                let result = alu::dec8(self.mem_read(bus, addr));
                self.internal(1);
                self.mem_write(bus, addr, result.value);
                self.set_f((self.regs.f & CF) | result.flags);
            }

            // LD (HL), n
            0x36 => {
                let value = self.imm8(bus);
                let addr = self.regs.hl();
                self.mem_write(bus, addr, value);
            }

            // SCF — X/Y from (Q xor F) | A
            0x37 => {
                let q_xor_f = self.prev_q ^ self.regs.f;
                self.set_f(
                    (self.regs.f & (SF | ZF | PF))
                        | CF
                        | ((q_xor_f | self.regs.a) & (YF | XF)),
                );
            }

            // LD A, (nn)
            0x3A => {
                let addr = self.imm16(bus);
                self.regs.wz = addr.wrapping_add(1);
                self.regs.a = self.mem_read(bus, addr);
            }

            // CCF — X/Y from (Q xor F) | A, H gets the old carry
            0x3F => {
                let old_carry = self.regs.f & CF;
                let q_xor_f = self.prev_q ^ self.regs.f;
                self.set_f(
                    (self.regs.f & (SF | ZF | PF))
                        | ((q_xor_f | self.regs.a) & (YF | XF))
                        | if old_carry != 0 { HF } else { CF },
                );
            }

            // HALT
            0x76 => self.regs.halted = true,

            // LD r, r' (with the (HL) row and column)
            0x40..=0x7F => {
                let src = op & 7;
                let dst = (op >> 3) & 7;
                if src == 6 {
                    let addr = self.regs.hl();
                    let value = self.mem_read(bus, addr);
                    self.set_reg8(dst, value);
                } else if dst == 6 {
                    let addr = self.regs.hl();
                    let value = self.get_reg8(src);
                    self.mem_write(bus, addr, value);
                } else {
                    let value = self.get_reg8(src);
                    self.set_reg8(dst, value);
                }
            }

            // ALU A, r / ALU A, (HL)
            0x80..=0xBF => {
                let r = op & 7;
                let value = if r == 6 {
                    let addr = self.regs.hl();
                    self.mem_read(bus, addr)
                } else {
                    self.get_reg8(r)
                };
                self.alu_a(op, value);
            }

            // RET cc
            0xC0 | 0xC8 | 0xD0 | 0xD8 | 0xE0 | 0xE8 | 0xF0 | 0xF8 => {
                self.internal(1);
                if self.condition((op >> 3) & 7) {
                    self.regs.pc = self.pop16(bus);
                    self.regs.wz = self.regs.pc;
                }
            }

            // POP rr
            0xC1 | 0xD1 | 0xE1 | 0xF1 => {
                let value = self.pop16(bus);
                self.set_rp_af(op >> 4, value);
            }

            // JP cc, nn
            0xC2 | 0xCA | 0xD2 | 0xDA | 0xE2 | 0xEA | 0xF2 | 0xFA => {
                let addr = self.imm16(bus);
                self.regs.wz = addr;
                if self.condition((op >> 3) & 7) {
                    self.regs.pc = addr;
                }
            }

            // JP nn
            0xC3 => {
                let addr = self.imm16(bus);
                self.regs.wz = addr;
                self.regs.pc = addr;
            }

            // CALL cc, nn
            0xC4 | 0xCC | 0xD4 | 0xDC | 0xE4 | 0xEC | 0xF4 | 0xFC => {
                let addr = self.imm16(bus);
                self.regs.wz = addr;
                if self.condition((op >> 3) & 7) {
                    self.internal(1);
                    let ret = self.regs.pc;
                    self.push16(bus, ret);
                    self.regs.pc = addr;
                }
            }

            // PUSH rr
            0xC5 | 0xD5 | 0xE5 | 0xF5 => {
                self.internal(1);
                let value = self.get_rp_af(op >> 4);
                self.push16(bus, value);
            }

            // ALU A, n
            0xC6 | 0xCE | 0xD6 | 0xDE | 0xE6 | 0xEE | 0xF6 | 0xFE => {
                let value = self.imm8(bus);
                self.alu_a(op, value);
            }

            // RST n
            0xC7 | 0xCF | 0xD7 | 0xDF | 0xE7 | 0xEF | 0xF7 | 0xFF => {
                self.internal(1);
                let ret = self.regs.pc;
                self.push16(bus, ret);
                self.regs.pc = u16::from(op & 0x38);
                self.regs.wz = self.regs.pc;
            }

            // RET
            0xC9 => {
                self.regs.pc = self.pop16(bus);
                self.regs.wz = self.regs.pc;
            }

            // CB prefix
            0xCB => self.execute_cb(bus),

            // CALL nn
            0xCD => {
                let addr = self.imm16(bus);
                self.regs.wz = addr;
                self.internal(1);
                let ret = self.regs.pc;
                self.push16(bus, ret);
                self.regs.pc = addr;
            }

            // OUT (n), A
            0xD3 => {
                let n = self.imm8(bus);
                let port = (u16::from(self.regs.a) << 8) | u16::from(n);
                self.regs.wz =
                    (u16::from(self.regs.a) << 8) | u16::from(n.wrapping_add(1));
                let a = self.regs.a;
                self.io_write(bus, port, a);
            }

            // EXX
            0xD9 => self.regs.exchange_main(),

            // IN A, (n)
            0xDB => {
                let n = self.imm8(bus);
                let port = (u16::from(self.regs.a) << 8) | u16::from(n);
                self.regs.wz = port.wrapping_add(1);
                self.regs.a = self.io_read(bus, port);
            }

            // DD prefix
            0xDD => self.execute_indexed(bus, IndexReg::Ix),

            // EX (SP), HL
            0xE3 => {
                let sp = self.regs.sp;
                let lo = self.mem_read(bus, sp);
                let hi = self.mem_read(bus, sp.wrapping_add(1));
                self.internal(1);
                let (l, h) = (self.regs.l, self.regs.h);
                self.mem_write(bus, sp.wrapping_add(1), h);
                self.mem_write(bus, sp, l);
                self.internal(2);
                self.regs.l = lo;
                self.regs.h = hi;
                self.regs.wz = self.regs.hl();
            }

            // JP (HL)
            0xE9 => self.regs.pc = self.regs.hl(),

            // EX DE, HL
            0xEB => {
                let de = self.regs.de();
                let hl = self.regs.hl();
                self.regs.set_de(hl);
                self.regs.set_hl(de);
            }

            // ED prefix
            0xED => self.execute_ed(bus),

            // DI
            0xF3 => {
                self.regs.iff1 = false;
                self.regs.iff2 = false;
            }

            // LD SP, HL
            0xF9 => {
                self.internal(2);
                self.regs.sp = self.regs.hl();
            }

            // EI — takes effect after the next instruction
            0xFB => {
                self.regs.iff1 = true;
                self.regs.iff2 = true;
                self.ei_delay = true;
            }

            // FD prefix
            0xFD => self.execute_indexed(bus, IndexReg::Iy),
        }
    }

    /// ALU operation selected by bits 3-5 of the opcode, applied to A.
    fn alu_a(&mut self, op: u8, value: u8) {
        let result = match (op >> 3) & 7 {
            0 => alu::add8(self.regs.a, value, false),
            1 => alu::add8(self.regs.a, value, self.regs.f & CF != 0),
            2 => alu::sub8(self.regs.a, value, false),
            3 => alu::sub8(self.regs.a, value, self.regs.f & CF != 0),
            4 => alu::and8(self.regs.a, value),
            5 => alu::xor8(self.regs.a, value),
            6 => alu::or8(self.regs.a, value),
            _ => alu::cp8(self.regs.a, value),
        };
        self.regs.a = result.value;
        self.set_f(result.flags);
    }

    /// Decimal adjust, including the exact H behaviour.
    fn daa(&mut self) {
        let a = self.regs.a;
        let nf = self.regs.f & NF != 0;
        let hf = self.regs.f & HF != 0;
        let cf = self.regs.f & CF != 0;

        let mut correction = 0u8;
        let mut new_cf = cf;
        if hf || a & 0x0F > 9 {
            correction |= 0x06;
        }
        if cf || a > 0x99 {
            correction |= 0x60;
            new_cf = true;
        }

        let value = if nf {
            a.wrapping_sub(correction)
        } else {
            a.wrapping_add(correction)
        };
        let new_hf = if nf {
            hf && a & 0x0F < 6
        } else {
            a & 0x0F > 9
        };

        self.regs.a = value;
        self.set_f(
            sz53p(value)
                | if nf { NF } else { 0 }
                | if new_hf { HF } else { 0 }
                | if new_cf { CF } else { 0 },
        );
    }

    // =======================================================================
    // Layer 2: CB prefix
    // =======================================================================

    fn execute_cb<B: Bus>(&mut self, bus: &mut B) {
        let op = self.fetch_opcode(bus);
        let r = op & 7;

        if r == 6 {
            let addr = self.regs.hl();
            let value = self.mem_read(bus, addr);
            self.internal(1);
            match op >> 6 {
                1 => {
                    // BIT n,(HL): X/Y leak from the high byte of WZ
                    let bit = (op >> 3) & 7;
                    let xy = (self.regs.wz >> 8) as u8;
                    let flags = self.bit_flags(value, bit, xy);
                    self.set_f(flags);
                }
                _ => {
                    let result = self.cb_modify(op, value);
                    self.mem_write(bus, addr, result);
                }
            }
            return;
        }

        let value = self.get_reg8(r);
        match op >> 6 {
            1 => {
                let bit = (op >> 3) & 7;
                let flags = self.bit_flags(value, bit, value);
                self.set_f(flags);
            }
            _ => {
                let result = self.cb_modify(op, value);
                self.set_reg8(r, result);
            }
        }
    }

    /// Rotate/shift/RES/SET result for a CB-prefixed opcode. Never BIT.
    fn cb_modify(&mut self, op: u8, value: u8) -> u8 {
        match op >> 6 {
            0 => {
                let result = match (op >> 3) & 7 {
                    0 => alu::rlc8(value),
                    1 => alu::rrc8(value),
                    2 => alu::rl8(value, self.regs.f & CF != 0),
                    3 => alu::rr8(value, self.regs.f & CF != 0),
                    4 => alu::sla8(value),
                    5 => alu::sra8(value),
                    6 => alu::sll8(value),
                    _ => alu::srl8(value),
                };
                self.set_f(result.flags);
                result.value
            }
            2 => value & !(1 << ((op >> 3) & 7)),
            _ => value | (1 << ((op >> 3) & 7)),
        }
    }

    /// Flags for BIT n: Z/P from the tested bit, S only for bit 7, X/Y from
    /// the given source byte (register value, WZ high, or indexed address
    /// high depending on the addressing form).
    fn bit_flags(&self, value: u8, bit: u8, xy_source: u8) -> u8 {
        let tested = value & (1 << bit);
        let mut flags = (self.regs.f & CF) | HF | (xy_source & (YF | XF));
        if tested == 0 {
            flags |= ZF | PF;
        }
        if bit == 7 && tested != 0 {
            flags |= SF;
        }
        flags
    }

    // =======================================================================
    // Layer 3: ED prefix
    // =======================================================================

    fn execute_ed<B: Bus>(&mut self, bus: &mut B) {
        let op = self.fetch_opcode(bus);

        match op {
            // IN r, (C) — r = 6 sets flags only (undocumented IN (C))
            0x40 | 0x48 | 0x50 | 0x58 | 0x60 | 0x68 | 0x70 | 0x78 => {
                let port = self.regs.bc();
                self.regs.wz = port.wrapping_add(1);
                let value = self.io_read(bus, port);
                let r = (op >> 3) & 7;
                if r != 6 {
                    self.set_reg8(r, value);
                }
                self.set_f((self.regs.f & CF) | sz53p(value));
            }

            // OUT (C), r — r = 6 outputs 0 (undocumented OUT (C),0)
            0x41 | 0x49 | 0x51 | 0x59 | 0x61 | 0x69 | 0x71 | 0x79 => {
                let port = self.regs.bc();
                self.regs.wz = port.wrapping_add(1);
                let r = (op >> 3) & 7;
                let value = if r == 6 { 0 } else { self.get_reg8(r) };
                self.io_write(bus, port, value);
            }

            // SBC HL, rr
            0x42 | 0x52 | 0x62 | 0x72 => {
                self.internal(7);
                let hl = self.regs.hl();
                self.regs.wz = hl.wrapping_add(1);
                let (value, flags) =
                    alu::sbc16(hl, self.get_rp(op >> 4), self.regs.f & CF != 0);
                self.regs.set_hl(value);
                self.set_f(flags);
            }

            // ADC HL, rr
            0x4A | 0x5A | 0x6A | 0x7A => {
                self.internal(7);
                let hl = self.regs.hl();
                self.regs.wz = hl.wrapping_add(1);
                let (value, flags) =
                    alu::adc16(hl, self.get_rp(op >> 4), self.regs.f & CF != 0);
                self.regs.set_hl(value);
                self.set_f(flags);
            }

            // LD (nn), rr
            0x43 | 0x53 | 0x63 | 0x73 => {
                let addr = self.imm16(bus);
                self.regs.wz = addr.wrapping_add(1);
                let value = self.get_rp(op >> 4);
                self.mem_write(bus, addr, value as u8);
                self.mem_write(bus, addr.wrapping_add(1), (value >> 8) as u8);
            }

            // LD rr, (nn)
            0x4B | 0x5B | 0x6B | 0x7B => {
                let addr = self.imm16(bus);
                self.regs.wz = addr.wrapping_add(1);
                let lo = self.mem_read(bus, addr);
                let hi = self.mem_read(bus, addr.wrapping_add(1));
                self.set_rp(op >> 4, u16::from(lo) | (u16::from(hi) << 8));
            }

            // NEG (documented at 44, mirrored across the row)
            0x44 | 0x4C | 0x54 | 0x5C | 0x64 | 0x6C | 0x74 | 0x7C => {
                let result = alu::sub8(0, self.regs.a, false);
                self.regs.a = result.value;
                self.set_f(result.flags);
            }

            // RETN / RETI (RETI shares the IFF restore on this hardware)
            0x45 | 0x4D | 0x55 | 0x5D | 0x65 | 0x6D | 0x75 | 0x7D => {
                self.regs.iff1 = self.regs.iff2;
                self.regs.pc = self.pop16(bus);
                self.regs.wz = self.regs.pc;
            }

            // IM 0 / IM 1 / IM 2 (with undocumented mirrors)
            0x46 | 0x4E | 0x66 | 0x6E => self.regs.im = 0,
            0x56 | 0x76 => self.regs.im = 1,
            0x5E | 0x7E => self.regs.im = 2,

            // LD I, A
            0x47 => {
                self.internal(1);
                self.regs.i = self.regs.a;
            }

            // LD R, A
            0x4F => {
                self.internal(1);
                self.regs.r = self.regs.a;
            }

            // LD A, I — P/V reports IFF2
            0x57 => {
                self.internal(1);
                self.regs.a = self.regs.i;
                self.set_f(
                    (self.regs.f & CF)
                        | sz53(self.regs.a)
                        | if self.regs.iff2 { PF } else { 0 },
                );
            }

            // LD A, R — P/V reports IFF2
            0x5F => {
                self.internal(1);
                self.regs.a = self.regs.r;
                self.set_f(
                    (self.regs.f & CF)
                        | sz53(self.regs.a)
                        | if self.regs.iff2 { PF } else { 0 },
                );
            }

            // RRD
            0x67 => {
                let addr = self.regs.hl();
                let value = self.mem_read(bus, addr);
                self.internal(4);
                let written = (self.regs.a << 4) | (value >> 4);
                self.regs.a = (self.regs.a & 0xF0) | (value & 0x0F);
                self.mem_write(bus, addr, written);
                self.regs.wz = addr.wrapping_add(1);
                self.set_f((self.regs.f & CF) | sz53p(self.regs.a));
            }

            // RLD
            0x6F => {
                let addr = self.regs.hl();
                let value = self.mem_read(bus, addr);
                self.internal(4);
                let written = (value << 4) | (self.regs.a & 0x0F);
                self.regs.a = (self.regs.a & 0xF0) | (value >> 4);
                self.mem_write(bus, addr, written);
                self.regs.wz = addr.wrapping_add(1);
                self.set_f((self.regs.f & CF) | sz53p(self.regs.a));
            }

            // Block transfers and searches
            0xA0 => self.ldx(bus, 1, false),
            0xA8 => self.ldx(bus, -1, false),
            0xB0 => self.ldx(bus, 1, true),
            0xB8 => self.ldx(bus, -1, true),
            0xA1 => self.cpx(bus, 1, false),
            0xA9 => self.cpx(bus, -1, false),
            0xB1 => self.cpx(bus, 1, true),
            0xB9 => self.cpx(bus, -1, true),
            0xA2 => self.inx(bus, 1, false),
            0xAA => self.inx(bus, -1, false),
            0xB2 => self.inx(bus, 1, true),
            0xBA => self.inx(bus, -1, true),
            0xA3 => self.outx(bus, 1, false),
            0xAB => self.outx(bus, -1, false),
            0xB3 => self.outx(bus, 1, true),
            0xBB => self.outx(bus, -1, true),

            // Every unassigned ED opcode is an 8-tact no-op
            _ => {}
        }
    }

    /// LDI/LDD/LDIR/LDDR.
    fn ldx<B: Bus>(&mut self, bus: &mut B, dir: i16, repeat: bool) {
        let hl = self.regs.hl();
        let de = self.regs.de();
        let value = self.mem_read(bus, hl);
        self.mem_write(bus, de, value);
        self.internal(2);

        self.regs.set_hl(hl.wrapping_add(dir as u16));
        self.regs.set_de(de.wrapping_add(dir as u16));
        let bc = self.regs.bc().wrapping_sub(1);
        self.regs.set_bc(bc);

        // X/Y leak bits 3 and 1 of A + copied byte
        let n = self.regs.a.wrapping_add(value);
        let mut flags = self.regs.f & (SF | ZF | CF);
        flags |= (n & XF) | ((n & 0x02) << 4);
        if bc != 0 {
            flags |= PF;
        }
        self.set_f(flags);

        if repeat && bc != 0 {
            self.internal(5);
            self.regs.pc = self.regs.pc.wrapping_sub(2);
            self.regs.wz = self.regs.pc.wrapping_add(1);
        }
    }

    /// CPI/CPD/CPIR/CPDR.
    fn cpx<B: Bus>(&mut self, bus: &mut B, dir: i16, repeat: bool) {
        let hl = self.regs.hl();
        let value = self.mem_read(bus, hl);
        self.internal(5);

        self.regs.set_hl(hl.wrapping_add(dir as u16));
        let bc = self.regs.bc().wrapping_sub(1);
        self.regs.set_bc(bc);
        self.regs.wz = self.regs.wz.wrapping_add(dir as u16);

        let result = alu::sub8(self.regs.a, value, false);
        // X/Y leak bits 3 and 1 of A - value - H
        let n = result
            .value
            .wrapping_sub(u8::from(result.flags & HF != 0));
        let mut flags = (result.flags & (SF | ZF | HF | NF)) | (self.regs.f & CF);
        flags |= (n & XF) | ((n & 0x02) << 4);
        if bc != 0 {
            flags |= PF;
        }
        self.set_f(flags);

        let found = result.flags & ZF != 0;
        if repeat && bc != 0 && !found {
            self.internal(5);
            self.regs.pc = self.regs.pc.wrapping_sub(2);
            self.regs.wz = self.regs.pc.wrapping_add(1);
        }
    }

    /// INI/IND/INIR/INDR.
    fn inx<B: Bus>(&mut self, bus: &mut B, dir: i16, repeat: bool) {
        self.internal(1);
        let port = self.regs.bc();
        self.regs.wz = port.wrapping_add(dir as u16);
        let value = self.io_read(bus, port);
        let hl = self.regs.hl();
        self.mem_write(bus, hl, value);

        self.regs.b = self.regs.b.wrapping_sub(1);
        self.regs.set_hl(hl.wrapping_add(dir as u16));

        let k = u16::from(value) + u16::from(self.regs.c.wrapping_add(dir as u8));
        self.set_f(Self::block_io_flags(self.regs.b, value, k));

        if repeat && self.regs.b != 0 {
            self.internal(5);
            self.regs.pc = self.regs.pc.wrapping_sub(2);
        }
    }

    /// OUTI/OUTD/OTIR/OTDR.
    fn outx<B: Bus>(&mut self, bus: &mut B, dir: i16, repeat: bool) {
        self.internal(1);
        let hl = self.regs.hl();
        let value = self.mem_read(bus, hl);
        self.regs.b = self.regs.b.wrapping_sub(1);
        let port = self.regs.bc();
        self.io_write(bus, port, value);

        self.regs.set_hl(hl.wrapping_add(dir as u16));
        self.regs.wz = port.wrapping_add(dir as u16);

        let k = u16::from(value) + u16::from(self.regs.l);
        self.set_f(Self::block_io_flags(self.regs.b, value, k));

        if repeat && self.regs.b != 0 {
            self.internal(5);
            self.regs.pc = self.regs.pc.wrapping_sub(2);
        }
    }

    /// The shared undocumented flag formula for the block I/O group.
    fn block_io_flags(b: u8, value: u8, k: u16) -> u8 {
        let mut flags = sz53(b);
        if value & 0x80 != 0 {
            flags |= NF;
        }
        if k > 0xFF {
            flags |= HF | CF;
        }
        if crate::flags::parity(((k & 7) as u8) ^ b) {
            flags |= PF;
        }
        flags
    }

    // =======================================================================
    // Layer 4: DD/FD prefixes (and the DD CB / FD CB sub-prefix)
    // =======================================================================

    fn execute_indexed<B: Bus>(&mut self, bus: &mut B, idx: IndexReg) {
        let op = self.fetch_opcode(bus);

        match op {
            // ADD IX/IY, rr (rr = 2 selects the index register itself)
            0x09 | 0x19 | 0x29 | 0x39 => {
                self.internal(7);
                let index = self.get_index(idx);
                self.regs.wz = index.wrapping_add(1);
                let rr = match (op >> 4) & 3 {
                    0 => self.regs.bc(),
                    1 => self.regs.de(),
                    2 => index,
                    _ => self.regs.sp,
                };
                let (value, flags) = alu::add16(index, rr);
                self.set_index(idx, value);
                self.set_f((self.regs.f & (SF | ZF | PF)) | flags);
            }

            // LD IX/IY, nn
            0x21 => {
                let value = self.imm16(bus);
                self.set_index(idx, value);
            }

            // LD (nn), IX/IY
            0x22 => {
                let addr = self.imm16(bus);
                self.regs.wz = addr.wrapping_add(1);
                let value = self.get_index(idx);
                self.mem_write(bus, addr, value as u8);
                self.mem_write(bus, addr.wrapping_add(1), (value >> 8) as u8);
            }

            // INC / DEC IX/IY
            0x23 => {
                self.internal(2);
                let value = self.get_index(idx).wrapping_add(1);
                self.set_index(idx, value);
            }
            0x2B => {
                self.internal(2);
                let value = self.get_index(idx).wrapping_sub(1);
                self.set_index(idx, value);
            }

            // INC/DEC IXH/IXL/IYH/IYL (undocumented)
            0x24 | 0x2C => {
                let r = (op >> 3) & 7;
                let result = alu::inc8(self.get_reg8_indexed(r, idx));
                self.set_reg8_indexed(r, result.value, idx);
                self.set_f((self.regs.f & CF) | result.flags);
            }
            0x25 | 0x2D => {
                let r = (op >> 3) & 7;
                let result = alu::dec8(self.get_reg8_indexed(r, idx));
                self.set_reg8_indexed(r, result.value, idx);
                self.set_f((self.regs.f & CF) | result.flags);
            }

            // LD IXH/IXL, n (undocumented)
            0x26 | 0x2E => {
                let value = self.imm8(bus);
                self.set_reg8_indexed((op >> 3) & 7, value, idx);
            }

            // LD IX/IY, (nn)
            0x2A => {
                let addr = self.imm16(bus);
                self.regs.wz = addr.wrapping_add(1);
                let lo = self.mem_read(bus, addr);
                let hi = self.mem_read(bus, addr.wrapping_add(1));
                self.set_index(idx, u16::from(lo) | (u16::from(hi) << 8));
            }

            // INC (IX+d)
            0x34 => {
                let addr = self.displaced_addr(bus, idx);
                self.internal(5);
                let result = alu::inc8(self.mem_read(bus, addr));
                self.internal(1);
                self.mem_write(bus, addr, result.value);
                self.set_f((self.regs.f & CF) | result.flags);
            }

            // DEC (IX+d)
            0x35 => {
                let addr = self.displaced_addr(bus, idx);
                self.internal(5);
                let result = alu::dec8(self.mem_read(bus, addr));
                self.internal(1);
                self.mem_write(bus, addr, result.value);
                self.set_f((self.regs.f & CF) | result.flags);
            }

            // LD (IX+d), n — the displacement and operand share the fetch
            0x36 => {
                let addr = self.displaced_addr(bus, idx);
                let value = self.imm8(bus);
                self.internal(2);
                self.mem_write(bus, addr, value);
            }

            // HALT keeps its meaning under a prefix
            0x76 => self.regs.halted = true,

            // LD group with index-register substitution; the (IX+d) row and
            // column use the *unsubstituted* register operand
            0x40..=0x7F => {
                let src = op & 7;
                let dst = (op >> 3) & 7;
                if src == 6 {
                    let addr = self.displaced_addr(bus, idx);
                    self.internal(5);
                    let value = self.mem_read(bus, addr);
                    self.set_reg8(dst, value);
                } else if dst == 6 {
                    let addr = self.displaced_addr(bus, idx);
                    let value = self.get_reg8(src);
                    self.internal(5);
                    self.mem_write(bus, addr, value);
                } else {
                    let value = self.get_reg8_indexed(src, idx);
                    self.set_reg8_indexed(dst, value, idx);
                }
            }

            // ALU group: (IX+d) or the substituted index halves
            0x80..=0xBF => {
                let r = op & 7;
                let value = if r == 6 {
                    let addr = self.displaced_addr(bus, idx);
                    self.internal(5);
                    self.mem_read(bus, addr)
                } else {
                    self.get_reg8_indexed(r, idx)
                };
                self.alu_a(op, value);
            }

            // DD CB / FD CB sub-prefix
            0xCB => self.execute_indexed_cb(bus, idx),

            // POP IX/IY
            0xE1 => {
                let value = self.pop16(bus);
                self.set_index(idx, value);
            }

            // EX (SP), IX/IY
            0xE3 => {
                let sp = self.regs.sp;
                let lo = self.mem_read(bus, sp);
                let hi = self.mem_read(bus, sp.wrapping_add(1));
                self.internal(1);
                let index = self.get_index(idx);
                self.mem_write(bus, sp.wrapping_add(1), (index >> 8) as u8);
                self.mem_write(bus, sp, index as u8);
                self.internal(2);
                let value = u16::from(lo) | (u16::from(hi) << 8);
                self.set_index(idx, value);
                self.regs.wz = value;
            }

            // PUSH IX/IY
            0xE5 => {
                self.internal(1);
                let value = self.get_index(idx);
                self.push16(bus, value);
            }

            // JP (IX)/(IY)
            0xE9 => self.regs.pc = self.get_index(idx),

            // LD SP, IX/IY
            0xF9 => {
                self.internal(2);
                self.regs.sp = self.get_index(idx);
            }

            // The prefix has no effect on anything else: execute the opcode
            // as if unprefixed (the fetch cost is already paid).
            _ => self.execute(bus, op),
        }
    }

    /// Fetch the displacement byte and form IX/IY + d. WZ tracks the
    /// effective address.
    fn displaced_addr<B: Bus>(&mut self, bus: &mut B, idx: IndexReg) -> u16 {
        let d = self.imm8(bus) as i8;
        let addr = self.get_index(idx).wrapping_add(d as u16);
        self.regs.wz = addr;
        addr
    }

    /// DD CB d op / FD CB d op: the displacement precedes the sub-opcode,
    /// and the sub-opcode read is not an M1 cycle (no refresh).
    fn execute_indexed_cb<B: Bus>(&mut self, bus: &mut B, idx: IndexReg) {
        let d = self.imm8(bus) as i8;
        let op = self.imm8(bus);
        self.internal(2);

        let addr = self.get_index(idx).wrapping_add(d as u16);
        self.regs.wz = addr;
        let value = self.mem_read(bus, addr);

        if op >> 6 == 1 {
            // BIT n,(IX+d): X/Y from the effective address high byte
            self.internal(1);
            let bit = (op >> 3) & 7;
            let xy = (addr >> 8) as u8;
            let flags = self.bit_flags(value, bit, xy);
            self.set_f(flags);
            return;
        }

        self.internal(1);
        let result = self.cb_modify(op, value);
        self.mem_write(bus, addr, result);

        // Undocumented: the result is also copied to the register selected
        // by the low three bits (unless it names (HL)).
        let r = op & 7;
        if r != 6 {
            self.set_reg8(r, result);
        }
    }
}
