//! Physical address type and vault address mapping.
//!
//! This module defines a strong type for the single physical address space
//! the co-simulation engine operates over (there is no virtual/physical
//! distinction modeled beyond the external `page_allocator` contract, see
//! [`crate::memory::Memory::page_allocator`]) and the bit-slicing logic that
//! extracts a vault index from an address for NMP dispatch.

/// A physical address in the simulated HMC-style address space.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PhysAddr(pub u64);

impl PhysAddr {
    /// Creates a new physical address from a raw 64-bit value.
    #[inline(always)]
    pub fn new(addr: u64) -> Self {
        Self(addr)
    }

    /// Returns the raw 64-bit address value.
    #[inline(always)]
    pub fn val(self) -> u64 {
        self.0
    }

    /// Aligns the address down to the start of its containing cache block.
    #[inline]
    pub fn block_aligned(self, line_bytes: u64) -> Self {
        Self(self.0 & !(line_bytes - 1))
    }
}

/// Extracts a vault index from a physical address by bit-slicing.
///
/// HMC-style addresses are laid out, from the low end, as: byte offset within
/// a transaction (`tx_bits`), column bits within a flit
/// (`flit_num_bits - tx_bits`), then the vault field, then the remaining
/// bank/row bits. `vault_target` reproduces that layout: clear anything above
/// `max_address_bits`, drop the transaction and column bits, then take the
/// low `vault_bits` of what remains.
#[derive(Clone, Copy, Debug)]
pub struct AddressMapper {
    max_address_mask: u64,
    tx_bits: u32,
    flit_num_bits: u32,
    vault_bits: u32,
    num_vaults: u32,
}

impl AddressMapper {
    /// Builds a mapper from the HMC geometry fields named in the config
    /// (`standard`, `stacks`, `channels`/vaults derive `vault_bits`).
    pub fn new(max_address_bits: u32, tx_bits: u32, flit_num_bits: u32, num_vaults: u32) -> Self {
        let vault_bits = num_vaults.max(1).next_power_of_two().trailing_zeros();
        Self {
            max_address_mask: if max_address_bits >= 64 {
                u64::MAX
            } else {
                (1u64 << max_address_bits) - 1
            },
            tx_bits,
            flit_num_bits,
            vault_bits,
            num_vaults,
        }
    }

    /// Returns the vault index `addr` belongs to, in `0..num_vaults`.
    pub fn vault_target(&self, addr: PhysAddr) -> u32 {
        if self.num_vaults <= 1 {
            return 0;
        }
        let masked = addr.val() & self.max_address_mask;
        let column_bits = self.flit_num_bits.saturating_sub(self.tx_bits);
        let shifted = masked >> (self.tx_bits as u64 + column_bits as u64);
        let vault_mask = (1u64 << self.vault_bits) - 1;
        (shifted & vault_mask) as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_vault_always_targets_zero() {
        let mapper = AddressMapper::new(32, 3, 6, 1);
        assert_eq!(mapper.vault_target(PhysAddr::new(0xDEAD_BEEF)), 0);
    }

    #[test]
    fn vault_bits_are_sliced_above_tx_and_column_bits() {
        // tx_bits=3, flit_num_bits=6 => 3 column bits dropped below the vault field.
        let mapper = AddressMapper::new(32, 3, 6, 4);
        let addr0 = PhysAddr::new(0b0_00_000_000);
        let addr1 = PhysAddr::new(0b1_00_000_000);
        assert_eq!(mapper.vault_target(addr0), 0);
        assert_eq!(mapper.vault_target(addr1), 1);
    }
}
