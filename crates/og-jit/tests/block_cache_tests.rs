//! Block cache behavior tests

use og_jit::{
    dispatch, DispatchTarget, JitBlockCache, PortablePatcher, PATCH_SITE_SIZE,
};

/// Allocate, emit and populate a block covering `instructions` guest
/// instructions at `start_address`, with exits at the given targets.
fn build_block(
    cache: &mut JitBlockCache,
    start_address: u32,
    instructions: u32,
    exits: &[u32],
) -> u32 {
    let block_num = cache.allocate_block(start_address);
    // Checked entry is a patch site; normal entry follows it.
    let code = vec![0u8; PATCH_SITE_SIZE * (2 + exits.len())];
    let entry = cache.emit_code(&code).unwrap();

    let exit_sites: Vec<usize> = exits
        .iter()
        .enumerate()
        .map(|(i, _)| entry + PATCH_SITE_SIZE * (2 + i))
        .collect();

    let b = cache.block_mut(block_num);
    b.checked_entry = entry;
    b.normal_entry = entry + PATCH_SITE_SIZE;
    b.code_size = code.len() as u32;
    b.original_size = instructions;
    for (site, &target) in exit_sites.iter().zip(exits) {
        b.link_data.push(og_jit::LinkData {
            exit_offset: *site,
            exit_address: target,
            linked: false,
        });
    }
    cache.finalize_block(block_num, true);
    block_num
}

fn new_cache() -> JitBlockCache {
    JitBlockCache::new(0x10000, Box::new(PortablePatcher::new()))
}

#[test]
fn test_block_lookup_exactness() {
    let mut cache = new_cache();
    let num = build_block(&mut cache, 0x8000_1000, 8, &[]);

    assert_eq!(
        cache.get_block_number_from_start_address(0x8000_1000),
        Some(num)
    );
    // Only the exact start address hits.
    assert_eq!(cache.get_block_number_from_start_address(0x8000_1004), None);

    cache.destroy_block(num, true);
    assert_eq!(cache.get_block_number_from_start_address(0x8000_1000), None);
}

#[test]
fn test_dispatch_hot_path() {
    let mut cache = new_cache();
    let num = build_block(&mut cache, 0x8000_2000, 4, &[]);
    let entry = cache.block(num).normal_entry;

    assert_eq!(
        dispatch(&cache, 0x8000_2000),
        DispatchTarget::Execute { entry }
    );
    assert_eq!(
        dispatch(&cache, 0x8000_2004),
        DispatchTarget::Compile {
            address: 0x8000_2004
        }
    );
}

#[test]
fn test_self_modifying_write_destroys_block() {
    let mut cache = new_cache();
    build_block(&mut cache, 0x1000, 16, &[]); // covers [0x1000, 0x1040)

    cache.write_tap(0x1010, 4);
    assert_eq!(cache.get_block_number_from_start_address(0x1000), None);
}

#[test]
fn test_idempotent_invalidation() {
    let mut cache = new_cache();
    build_block(&mut cache, 0x2000, 8, &[]); // one 32-byte granule

    cache.invalidate_icache(0x2000, 32, false);
    assert_eq!(cache.get_block_number_from_start_address(0x2000), None);

    // Second call: the granule bit is already clear, so this is a no-op
    // and no double-destroy is reported.
    cache.invalidate_icache(0x2000, 32, false);
}

#[test]
fn test_invalidation_misses_unrelated_range() {
    let mut cache = new_cache();
    let num = build_block(&mut cache, 0x3000, 8, &[]);

    cache.invalidate_icache(0x4000, 0x100, false);
    assert_eq!(cache.get_block_number_from_start_address(0x3000), Some(num));
}

#[test]
fn test_link_then_unlink() {
    let mut cache = new_cache();

    // A exits to B's start address before B exists.
    let a = build_block(&mut cache, 0x5000, 8, &[0x6000]);
    assert!(!cache.block(a).link_data[0].linked);

    // Finalizing B links A's exit as a side effect.
    let b = build_block(&mut cache, 0x6000, 8, &[]);
    assert!(cache.block(a).link_data[0].linked);

    // The patch site now encodes a jump to B's checked entry.
    let site_offset = cache.block(a).link_data[0].exit_offset;
    let site = cache.code(site_offset, PATCH_SITE_SIZE);
    assert_eq!(site[0], PortablePatcher::OP_JUMP);
    assert_eq!(
        u32::from_le_bytes(site[1..5].try_into().unwrap()) as usize,
        cache.block(b).checked_entry
    );

    // Destroying B marks A's exit unlinked again.
    cache.destroy_block(b, true);
    assert!(!cache.block(a).link_data[0].linked);

    // B's checked entry redirects stale callers to the dispatcher.
    let entry = cache.block(b).checked_entry;
    let site = cache.code(entry, PATCH_SITE_SIZE);
    assert_eq!(site[0], PortablePatcher::OP_DISPATCH);
    assert_eq!(u32::from_le_bytes(site[1..5].try_into().unwrap()), 0x6000);
}

#[test]
fn test_link_both_directions_at_finalize() {
    let mut cache = new_cache();
    // B first, then A exiting to B: A links immediately at its own
    // finalization.
    build_block(&mut cache, 0x7000, 8, &[]);
    let a = build_block(&mut cache, 0x8000, 8, &[0x7000]);
    assert!(cache.block(a).link_data[0].linked);
}

#[test]
fn test_forced_flush_keeps_fast_write_hints() {
    let mut cache = new_cache();
    cache.add_fast_write_hint(0x9004);

    cache.invalidate_icache(0x9000, 0x20, true);
    assert!(cache.has_fast_write_hint(0x9004));

    cache.invalidate_icache(0x9000, 0x20, false);
    assert!(!cache.has_fast_write_hint(0x9004));
}

#[test]
fn test_clear_empties_everything() {
    let mut cache = new_cache();
    build_block(&mut cache, 0xA000, 8, &[0xB000]);
    build_block(&mut cache, 0xB000, 8, &[]);

    cache.clear();
    assert_eq!(cache.num_blocks(), 0);
    assert_eq!(cache.get_block_number_from_start_address(0xA000), None);
    assert_eq!(cache.get_block_number_from_start_address(0xB000), None);

    // The cache is usable again immediately.
    let num = build_block(&mut cache, 0xA000, 8, &[]);
    assert_eq!(cache.get_block_number_from_start_address(0xA000), Some(num));
}

#[test]
fn test_reset_recovers_arena_space() {
    let mut cache = JitBlockCache::new(64, Box::new(PortablePatcher::new()));
    let num = cache.allocate_block(0x1000);
    let entry = cache.emit_code(&[0u8; 64]).unwrap();
    let b = cache.block_mut(num);
    b.checked_entry = entry;
    b.normal_entry = entry;
    b.original_size = 8;
    cache.finalize_block(num, false);

    // Arena exhausted: the next emission fails, the caller resets.
    assert!(cache.emit_code(&[0u8; 8]).is_none());
    cache.reset();
    assert!(cache.emit_code(&[0u8; 8]).is_some());
}

#[test]
fn test_duplicate_start_address_replaces_block() {
    let mut cache = new_cache();
    let first = build_block(&mut cache, 0xC000, 8, &[]);
    let second = build_block(&mut cache, 0xC000, 8, &[]);

    assert!(cache.block(first).invalid);
    assert_eq!(
        cache.get_block_number_from_start_address(0xC000),
        Some(second)
    );
}
