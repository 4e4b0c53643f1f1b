// This module owns every register record created during a compilation. The RegisterFile is
// an arena: the fixed physical pool (8 general-purpose registers r0..r7 with ids 0..7 and 8
// floating-point registers xmm0..xmm7 with ids 100..107) is created up front, and virtual
// registers are appended whenever a request finds its bank exhausted. Allocation state for
// physical registers is tracked in a RegBitSet with one u64 mask per bank; a register's
// `allocated` flag is kept in lockstep with that set. Allocation is first-fit in pool order
// and never fails. The post-lowering `bind_virtuals` pass is a linear scan without liveness:
// each virtual operand is bound to the first free physical register of its class and the
// operand is rewritten to the physical handle.

//! Register arena, physical pool and the linear-scan binding pass.

use super::ir::{Function, RegClass, RegId, Register, RegisterKind};

/// Number of register banks (general, float).
pub const BANK_COUNT: usize = 2;

/// Physical registers per bank.
pub const REGISTERS_PER_BANK: u8 = 8;

/// Ids of floating-point registers start here.
pub const FLOAT_ID_BASE: u32 = 100;

/// Ids of virtual registers start here; they never collide with physical ids.
pub const VIRTUAL_ID_BASE: u32 = 200;

/// Bit set for tracking physical registers, one mask per bank.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegBitSet {
    banks: [u64; BANK_COUNT],
}

impl RegBitSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, bank: usize, index: u8) -> bool {
        bank < BANK_COUNT && index < 64 && (self.banks[bank] & (1u64 << index)) != 0
    }

    pub fn set(&mut self, bank: usize, index: u8) {
        if bank < BANK_COUNT && index < 64 {
            self.banks[bank] |= 1u64 << index;
        }
    }

    pub fn clear(&mut self, bank: usize, index: u8) {
        if bank < BANK_COUNT && index < 64 {
            self.banks[bank] &= !(1u64 << index);
        }
    }

    /// Lowest index in `bank` below `limit` that is not set.
    pub fn first_clear(&self, bank: usize, limit: u8) -> Option<u8> {
        if bank >= BANK_COUNT {
            return None;
        }
        let free = !self.banks[bank] & mask_below(limit);
        if free == 0 {
            return None;
        }
        Some(free.trailing_zeros() as u8)
    }

    pub fn count_in_bank(&self, bank: usize) -> u32 {
        if bank >= BANK_COUNT {
            return 0;
        }
        self.banks[bank].count_ones()
    }

    pub fn is_empty(&self) -> bool {
        self.banks.iter().all(|mask| *mask == 0)
    }
}

fn mask_below(limit: u8) -> u64 {
    if limit >= 64 {
        u64::MAX
    } else {
        (1u64 << limit) - 1
    }
}

/// Owner of all register records of one compilation.
#[derive(Debug, Clone)]
pub struct RegisterFile {
    regs: Vec<Register>,
    /// Physical handles by bank, in pool order.
    physical: [Vec<RegId>; BANK_COUNT],
    active: RegBitSet,
    next_virtual: u32,
}

impl RegisterFile {
    pub fn new() -> Self {
        let mut file = Self {
            regs: Vec::new(),
            physical: [Vec::new(), Vec::new()],
            active: RegBitSet::new(),
            next_virtual: 0,
        };
        for i in 0..REGISTERS_PER_BANK {
            file.push_physical(RegisterKind::General, RegClass::General, i as u32, format!("r{i}"), i);
        }
        for i in 0..REGISTERS_PER_BANK {
            file.push_physical(
                RegisterKind::Float,
                RegClass::Float,
                FLOAT_ID_BASE + i as u32,
                format!("xmm{i}"),
                i,
            );
        }
        file
    }

    fn push_physical(&mut self, kind: RegisterKind, class: RegClass, id: u32, name: String, hw_index: u8) {
        let handle = RegId(self.regs.len() as u32);
        self.regs.push(Register {
            id,
            kind,
            class,
            allocated: false,
            name,
            binding_name: None,
            bound_to: None,
            hw_index,
        });
        self.physical[class.bank()].push(handle);
    }

    pub fn get(&self, reg: RegId) -> &Register {
        &self.regs[reg.index()]
    }

    /// Allocate a register of `class`.
    ///
    /// Returns the first free physical register of the class; when the bank
    /// is exhausted a new virtual register is minted instead.
    pub fn allocate(&mut self, class: RegClass) -> RegId {
        let bank = class.bank();
        match self.active.first_clear(bank, REGISTERS_PER_BANK) {
            Some(index) => {
                let handle = self.physical[bank][index as usize];
                self.active.set(bank, index);
                self.regs[handle.index()].allocated = true;
                log::trace!("allocate {}", self.regs[handle.index()].name);
                handle
            }
            None => self.mint_virtual(class),
        }
    }

    /// Allocate a register and record the source-level name bound to it.
    pub fn allocate_named(&mut self, class: RegClass, name: &str) -> RegId {
        let reg = self.allocate(class);
        self.regs[reg.index()].binding_name = Some(name.to_string());
        reg
    }

    fn mint_virtual(&mut self, class: RegClass) -> RegId {
        let n = self.next_virtual;
        self.next_virtual += 1;
        let handle = RegId(self.regs.len() as u32);
        self.regs.push(Register {
            id: VIRTUAL_ID_BASE + n,
            kind: RegisterKind::Virtual,
            class,
            allocated: false,
            name: format!("v{n}"),
            binding_name: None,
            bound_to: None,
            hw_index: 0,
        });
        log::trace!("{:?} pool exhausted, minted v{n}", class);
        handle
    }

    /// Release `reg`. Freeing a free or virtual register does nothing.
    pub fn free(&mut self, reg: RegId) {
        let record = &mut self.regs[reg.index()];
        if record.is_virtual() || !record.allocated {
            return;
        }
        record.allocated = false;
        record.binding_name = None;
        self.active.clear(record.class.bank(), record.hw_index);
        log::trace!("free {}", record.name);
    }

    pub fn is_allocated(&self, reg: RegId) -> bool {
        self.regs[reg.index()].allocated
    }

    /// Number of physical registers of `class` currently allocated.
    pub fn active_count(&self, class: RegClass) -> u32 {
        self.active.count_in_bank(class.bank())
    }

    pub fn active_set(&self) -> &RegBitSet {
        &self.active
    }

    pub fn physical(&self, class: RegClass) -> &[RegId] {
        &self.physical[class.bank()]
    }

    pub fn virtual_count(&self) -> u32 {
        self.next_virtual
    }

    /// Bind every virtual operand to the first free physical register of
    /// its class, in instruction order across all functions.
    ///
    /// There is no liveness tracking: a virtual register keeps the first
    /// binding it receives, and bindings do not mark the physical register
    /// as allocated. Operands whose class has no free register stay virtual.
    /// Returns the number of operands rewritten.
    pub fn bind_virtuals(&mut self, functions: &mut [Function]) -> usize {
        let mut rebound = 0;
        for func in functions.iter_mut() {
            for block in func.blocks.iter_mut() {
                for instr in block.instructions.iter_mut() {
                    for operand in instr.operands.iter_mut() {
                        if let Some(physical) = self.binding_for(*operand) {
                            log::trace!(
                                "{}: bind {} -> {}",
                                func.name,
                                self.regs[operand.index()].name,
                                self.regs[physical.index()].name
                            );
                            *operand = physical;
                            rebound += 1;
                        }
                    }
                }
            }
        }
        rebound
    }

    fn binding_for(&mut self, reg: RegId) -> Option<RegId> {
        let record = &self.regs[reg.index()];
        if !record.is_virtual() {
            return None;
        }
        if let Some(bound) = record.bound_to {
            return Some(bound);
        }
        let bank = record.class.bank();
        let index = self.active.first_clear(bank, REGISTERS_PER_BANK)?;
        let physical = self.physical[bank][index as usize];
        self.regs[reg.index()].bound_to = Some(physical);
        Some(physical)
    }
}

impl Default for RegisterFile {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ir::{Instruction, Opcode};

    #[test]
    fn test_reg_bitset() {
        let mut set = RegBitSet::new();
        assert!(set.is_empty());

        set.set(0, 0);
        set.set(0, 2);
        set.set(1, 7);

        assert!(set.contains(0, 0));
        assert!(!set.contains(0, 1));
        assert!(set.contains(1, 7));
        assert_eq!(set.first_clear(0, 8), Some(1));
        assert_eq!(set.count_in_bank(0), 2);

        set.clear(0, 0);
        assert_eq!(set.first_clear(0, 8), Some(0));
        assert!(!set.contains(5, 0));
    }

    #[test]
    fn test_first_clear_respects_limit() {
        let mut set = RegBitSet::new();
        for i in 0..4 {
            set.set(0, i);
        }
        assert_eq!(set.first_clear(0, 4), None);
        assert_eq!(set.first_clear(0, 5), Some(4));
    }

    #[test]
    fn test_physical_pool_layout() {
        let regs = RegisterFile::new();
        let general = regs.physical(RegClass::General);
        let float = regs.physical(RegClass::Float);
        assert_eq!(general.len(), 8);
        assert_eq!(float.len(), 8);
        assert_eq!(regs.get(general[3]).name, "r3");
        assert_eq!(regs.get(general[3]).id, 3);
        assert_eq!(regs.get(float[2]).name, "xmm2");
        assert_eq!(regs.get(float[2]).id, 102);
    }

    #[test]
    fn test_first_fit_allocation() {
        let mut regs = RegisterFile::new();
        let a = regs.allocate(RegClass::General);
        let b = regs.allocate(RegClass::General);
        let f = regs.allocate(RegClass::Float);
        assert_eq!(regs.get(a).name, "r0");
        assert_eq!(regs.get(b).name, "r1");
        assert_eq!(regs.get(f).name, "xmm0");

        regs.free(a);
        let c = regs.allocate(RegClass::General);
        assert_eq!(c, a);
    }

    #[test]
    fn test_exhaustion_mints_increasing_virtuals() {
        let mut regs = RegisterFile::new();
        for _ in 0..8 {
            regs.allocate(RegClass::General);
        }
        let v0 = regs.allocate(RegClass::General);
        let v1 = regs.allocate(RegClass::General);
        let v2 = regs.allocate(RegClass::Float);

        assert!(regs.get(v0).is_virtual());
        assert_eq!(regs.get(v0).name, "v0");
        assert_eq!(regs.get(v1).name, "v1");
        assert!(regs.get(v1).id > regs.get(v0).id);
        // Float bank still has room.
        assert!(!regs.get(v2).is_virtual());
        assert_eq!(regs.virtual_count(), 2);
    }

    #[test]
    fn test_free_is_idempotent() {
        let mut regs = RegisterFile::new();
        let a = regs.allocate(RegClass::General);
        let b = regs.allocate(RegClass::General);

        regs.free(a);
        regs.free(a);
        assert!(!regs.is_allocated(a));
        assert!(regs.is_allocated(b));
        assert_eq!(regs.active_count(RegClass::General), 1);

        // Never allocated.
        let unused = regs.physical(RegClass::General)[5];
        regs.free(unused);
        assert_eq!(regs.active_count(RegClass::General), 1);
    }

    #[test]
    fn test_allocated_flag_matches_active_set() {
        let mut regs = RegisterFile::new();
        let handles: Vec<_> = (0..6).map(|_| regs.allocate(RegClass::General)).collect();
        regs.free(handles[1]);
        regs.free(handles[4]);

        for reg in regs.physical(RegClass::General).to_vec() {
            let record = regs.get(reg);
            assert_eq!(
                record.allocated,
                regs.active_set().contains(0, record.hw_index())
            );
        }
    }

    #[test]
    fn test_bind_virtuals_rewrites_operands() {
        let mut regs = RegisterFile::new();
        let held: Vec<_> = (0..8).map(|_| regs.allocate(RegClass::General)).collect();
        let v = regs.allocate(RegClass::General);

        let mut func = Function::new("f");
        let entry = func.create_block("f_entry");
        func.block_mut(entry)
            .push(Instruction::with_immediate(Opcode::Mov, v, 1));
        func.block_mut(entry)
            .push(Instruction::with_operands(Opcode::Add, &[v, v, held[0]]));

        // Still exhausted: nothing to bind to.
        let mut funcs = vec![func];
        assert_eq!(regs.bind_virtuals(&mut funcs), 0);

        regs.free(held[2]);
        assert_eq!(regs.bind_virtuals(&mut funcs), 3);

        let instrs: Vec<_> = funcs[0].instructions().collect();
        assert_eq!(instrs[0].operands[0], held[2]);
        assert_eq!(instrs[1].operands, vec![held[2], held[2], held[0]]);
        assert_eq!(regs.get(v).bound_to, Some(held[2]));
    }
}
