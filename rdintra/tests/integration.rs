use rdintra::predict::{DC, HOR, PLANAR, VER};
use rdintra::{
    search_picture, Area, BlockDecision, ChromaFormat, CodingBlock, ComponentId, IntraSearch,
    Neighbours, PcmConfig, PcmTieBreak, Picture, ResidualTreeSearch, SearchConfig, TrialStage,
};

fn textured(width: u32, height: u32, format: ChromaFormat, seed: u32) -> Picture {
    let mut pic = Picture::new(width, height, format, 8);
    let mut state = seed.wrapping_mul(2654435761).wrapping_add(1);
    for comp in ComponentId::ALL.iter().take(format.num_components()) {
        let plane = pic.plane_mut(*comp);
        for y in 0..plane.height {
            for x in 0..plane.width {
                state = state.wrapping_mul(1103515245).wrapping_add(12345);
                let noise = (state >> 16) % 24;
                let value = (x * 7 + y * 3 + noise) % 256;
                plane.set(x, y, value as u16);
            }
        }
    }
    pic
}

const SPLIT_HEURISTIC_TOLERANCE: f64 = 0.01;

fn pcm_config(bit_depth: u8) -> PcmConfig {
    PcmConfig {
        enabled: true,
        min_size: 8,
        max_size: 32,
        bit_depth_luma: bit_depth,
        bit_depth_chroma: bit_depth,
        tie_break: PcmTieBreak::PreferPredictive,
    }
}

fn run(config: SearchConfig, block: CodingBlock, org: &Picture) -> (BlockDecision, Picture) {
    let mut search = IntraSearch::new(config).unwrap();
    let mut rec = org.clone();
    let decision = search.search(&block, org, &mut rec).unwrap();
    (decision, rec)
}

fn block_samples(pic: &Picture, comp: ComponentId, area: &Area) -> Vec<i32> {
    pic.read(comp, area)
}

#[test]
fn constant_block_prefers_dc_over_pcm() {
    let config = SearchConfig { pcm: pcm_config(8), ..Default::default() };
    let org = Picture::solid(24, 24, ChromaFormat::Yuv420, 8, [100, 100, 100]);
    let block = CodingBlock::new(8, 8, 8)
        .with_neighbours(Neighbours::ALL)
        .with_modes(Some(DC), Some(PLANAR));

    let (decision, _) = run(config, block, &org);
    assert_eq!(decision.luma_mode, DC);
    assert!(!decision.pcm);
    assert_eq!(decision.total.distortion, 0);
    assert!(!decision.is_split());
}

#[test]
fn zero_bit_pcm_is_the_only_way_pcm_wins_a_flat_block() {
    let org = Picture::solid(16, 16, ChromaFormat::Yuv420, 8, [0, 0, 0]);
    let block = CodingBlock::new(0, 0, 8);

    let config = SearchConfig { pcm: pcm_config(8), ..Default::default() };
    let (decision, _) = run(config, block, &org);
    assert!(!decision.pcm);

    let config = SearchConfig { pcm: pcm_config(0), ..Default::default() };
    let (decision, rec) = run(config, block, &org);
    assert!(decision.pcm);
    assert!(decision.tus.is_empty());
    assert!(decision.chroma_tus.is_empty());
    assert_eq!(decision.total.distortion, 0);
    for comp in ComponentId::ALL {
        assert!(block_samples(&rec, comp, &block.area).iter().all(|&s| s == 0));
    }
}

#[test]
fn pcm_disabled_by_size_range() {
    let mut pcm = pcm_config(0);
    pcm.min_size = 16;
    let config = SearchConfig { pcm, ..Default::default() };
    let org = Picture::solid(16, 16, ChromaFormat::Yuv420, 8, [0, 0, 0]);
    let (decision, _) = run(config, CodingBlock::new(0, 0, 8), &org);
    assert!(!decision.pcm);
}

#[test]
fn pcm_ties_follow_the_configured_preference() {
    let org = textured(16, 16, ChromaFormat::Yuv420, 13);
    let block = CodingBlock::new(0, 0, 8);
    for (tie_break, expected) in
        [(PcmTieBreak::PreferPredictive, false), (PcmTieBreak::PreferPcm, true)]
    {
        // lossless coding and full-depth PCM both reconstruct exactly; with a
        // zero multiplier both cost nothing
        let pcm = PcmConfig { tie_break, ..pcm_config(8) };
        let config = SearchConfig { lossless: true, pcm, ..Default::default() };
        let mut search = IntraSearch::new(config).unwrap();
        search.set_lambda(0.0);
        search.record_trials(true);
        let mut rec = org.clone();
        let decision = search.search(&block, &org, &mut rec).unwrap();

        let costs: Vec<f64> = search
            .trials()
            .iter()
            .filter(|r| r.stage == TrialStage::Pcm)
            .map(|r| r.cost)
            .collect();
        assert_eq!(costs, vec![0.0, 0.0]);
        assert_eq!(decision.pcm, expected, "{tie_break:?}");
        assert_eq!(decision.total.distortion, 0);
        assert_eq!(
            block_samples(&rec, ComponentId::Y, &block.area),
            block_samples(&org, ComponentId::Y, &block.area)
        );
    }
}

#[test]
fn left_only_block_substitutes_missing_above_mode() {
    let config = SearchConfig::default();
    let org = textured(16, 16, ChromaFormat::Yuv420, 3);
    let neighbours = Neighbours { left: true, below_left: true, ..Neighbours::NONE };
    let block = CodingBlock::new(8, 0, 8)
        .with_neighbours(neighbours)
        .with_modes(Some(VER), None);

    let mut search = IntraSearch::new(config).unwrap();
    search.record_trials(true);
    let mut rec = org.clone();
    let decision = search.search(&block, &org, &mut rec).unwrap();
    assert!((decision.luma_mode as usize) < rdintra::predict::NUM_LUMA_MODES);

    let recorder = search.recorder().unwrap();
    let prune = recorder.groups(TrialStage::FastPrune);
    assert_eq!(prune.len(), 1);
    assert_eq!(prune[0].len(), rdintra::predict::NUM_LUMA_MODES);

    let tried: Vec<u8> =
        recorder.groups(TrialStage::LumaMode)[0].iter().map(|r| r.mode).collect();
    for mpm in [VER, DC, PLANAR] {
        assert!(tried.contains(&mpm), "missing most probable mode {mpm}");
    }
}

#[test]
fn unavailable_above_neighbour_mode_is_ignored() {
    let config = SearchConfig { fast_candidates: Some(1), ..Default::default() };
    let org = textured(16, 16, ChromaFormat::Yuv420, 3);
    let left_only = Neighbours { left: true, below_left: true, ..Neighbours::NONE };
    let tried = |above: Option<u8>| {
        let block = CodingBlock::new(8, 0, 8)
            .with_neighbours(left_only)
            .with_modes(Some(HOR), above);
        let mut search = IntraSearch::new(config.clone()).unwrap();
        search.record_trials(true);
        let mut rec = org.clone();
        let decision = search.search(&block, &org, &mut rec).unwrap();
        let modes: Vec<u8> = search.recorder().unwrap().groups(TrialStage::LumaMode)[0]
            .iter()
            .map(|r| r.mode)
            .collect();
        (modes, decision)
    };

    let (stale, stale_decision) = tried(Some(VER));
    let (missing, missing_decision) = tried(None);
    assert_eq!(stale, missing);
    assert_eq!(stale_decision, missing_decision);
    for mpm in [HOR, DC, PLANAR] {
        assert!(stale.contains(&mpm), "missing most probable mode {mpm}");
    }
}

#[test]
fn no_split_below_threshold_keeps_large_transforms() {
    let config = SearchConfig {
        residual_tree: ResidualTreeSearch::NoSplitBelow { min_split_size: 16 },
        ..Default::default()
    };
    let org = textured(32, 32, ChromaFormat::Yuv420, 11);
    let block = CodingBlock::new(0, 0, 32);

    let mut search = IntraSearch::new(config.clone()).unwrap();
    search.record_trials(true);
    let mut rec = org.clone();
    let decision = search.search(&block, &org, &mut rec).unwrap();
    assert!(decision.tus.iter().all(|tu| tu.area.width >= 16));
    assert!(
        search
            .trials()
            .iter()
            .filter(|r| r.stage == TrialStage::LumaTransform)
            .all(|r| r.area.width >= 16)
    );

    let (again, rec_again) = run(config, block, &org);
    assert_eq!(decision, again);
    assert_eq!(rec, rec_again);

    let (exhaustive, exhaustive_rec) = run(SearchConfig::default(), block, &org);
    let (exhaustive_again, exhaustive_rec_again) = run(SearchConfig::default(), block, &org);
    assert_eq!(exhaustive, exhaustive_again);
    assert_eq!(exhaustive_rec, exhaustive_rec_again);
    // adaptive contexts make sibling costs depend on earlier choices, so the
    // full search is only bounded up to a small tolerance
    assert!(
        exhaustive.luma.cost <= decision.luma.cost * (1.0 + SPLIT_HEURISTIC_TOLERANCE),
        "exhaustive {} vs no-split-below {}",
        exhaustive.luma.cost,
        decision.luma.cost
    );
}

#[test]
fn exhaustive_search_tries_both_root_options() {
    let org = textured(32, 32, ChromaFormat::Yuv420, 5);
    let block = CodingBlock::new(0, 0, 32);
    let mut search = IntraSearch::new(SearchConfig::default()).unwrap();
    search.record_trials(true);
    let mut rec = org.clone();
    search.search(&block, &org, &mut rec).unwrap();

    let root: Vec<&str> = search
        .trials()
        .iter()
        .filter(|r| r.stage == TrialStage::LumaSplit && r.depth == 0)
        .map(|r| r.label)
        .collect();
    assert!(root.contains(&"no-split"));
    assert!(root.contains(&"split"));
    assert!(
        search
            .trials()
            .iter()
            .any(|r| r.stage == TrialStage::LumaTransform && r.area.width == 4)
    );
}

#[test]
fn split_choices_follow_the_cheaper_option() {
    let org = textured(32, 32, ChromaFormat::Yuv420, 5);
    let block = CodingBlock::new(0, 0, 32);
    for qp in [17, 32] {
        let mut search = IntraSearch::new(SearchConfig { qp, ..Default::default() }).unwrap();
        search.record_trials(true);
        let mut rec = org.clone();
        let decision = search.search(&block, &org, &mut rec).unwrap();

        let mut checked = 0;
        for group in search.recorder().unwrap().groups(TrialStage::LumaSplit) {
            let node = &group[0];
            if node.mode != decision.luma_mode {
                continue;
            }
            // nodes on the accepted tree are tiled by accepted transform units
            let inside: Vec<_> =
                decision.tus.iter().filter(|tu| node.area.contains_area(&tu.area)).collect();
            if inside.is_empty() {
                continue;
            }
            let cost = |label: &str| group.iter().find(|r| r.label == label).unwrap().cost;
            let split = inside.iter().any(|tu| tu.depth > node.depth);
            assert_eq!(
                split,
                cost("split") < cost("no-split"),
                "qp {qp}: node {:?} kept the costlier option",
                node.area
            );
            checked += 1;
        }
        assert!(checked > 0, "qp {qp}: root split choice was not recorded");
    }
}

#[test]
fn check_first_refines_only_the_winner() {
    let config = SearchConfig { residual_tree: ResidualTreeSearch::CheckFirst, ..Default::default() };
    let org = textured(16, 16, ChromaFormat::Yuv420, 9);
    let block = CodingBlock::new(0, 0, 16);
    let mut search = IntraSearch::new(config).unwrap();
    search.record_trials(true);
    let mut rec = org.clone();
    let decision = search.search(&block, &org, &mut rec).unwrap();

    let modes: Vec<_> =
        search.trials().iter().filter(|r| r.stage == TrialStage::LumaMode).collect();
    let full: Vec<_> = modes.iter().filter(|r| r.label == "full").collect();
    assert_eq!(full.len(), 1);
    assert_eq!(full[0].mode, decision.luma_mode);
    assert!(modes.iter().filter(|r| r.label == "unsplit").count() > 1);
}

#[test]
fn lossless_reconstruction_is_exact() {
    let config = SearchConfig { lossless: true, ..Default::default() };
    let org = textured(16, 16, ChromaFormat::Yuv420, 21);
    let block = CodingBlock::new(0, 0, 16);
    let mut rec = Picture::new(16, 16, ChromaFormat::Yuv420, 8);
    let mut search = IntraSearch::new(config).unwrap();
    let decision = search.search(&block, &org, &mut rec).unwrap();
    assert_eq!(decision.total.distortion, 0);
    for comp in ComponentId::ALL {
        assert_eq!(
            block_samples(&rec, comp, &block.area),
            block_samples(&org, comp, &block.area)
        );
    }
}

#[test]
fn dpcm_ranks_only_horizontal_and_vertical() {
    let config = SearchConfig { lossless: true, dpcm_first_pass: true, ..Default::default() };
    let org = textured(16, 16, ChromaFormat::Yuv420, 4);
    let mut search = IntraSearch::new(config).unwrap();
    search.record_trials(true);
    let mut rec = org.clone();
    search.search(&CodingBlock::new(0, 0, 8), &org, &mut rec).unwrap();

    let dpcm: Vec<u8> = search
        .trials()
        .iter()
        .filter(|r| r.stage == TrialStage::FastPrune && r.label == "dpcm")
        .map(|r| r.mode)
        .collect();
    assert_eq!(dpcm, vec![HOR, VER]);
}

#[test]
fn cross_component_prediction_only_with_derived_mode() {
    let config = SearchConfig {
        chroma_format: ChromaFormat::Yuv444,
        cross_component: true,
        qp: 22,
        ..Default::default()
    };
    let org = textured(16, 16, ChromaFormat::Yuv444, 8);
    let mut search = IntraSearch::new(config).unwrap();
    search.record_trials(true);
    let mut rec = org.clone();
    let decision = search.search(&CodingBlock::new(0, 0, 16), &org, &mut rec).unwrap();

    for r in search.trials().iter().filter(|r| r.label == "ccp") {
        assert_eq!(r.stage, TrialStage::ChromaTransform);
        assert_eq!(r.mode, decision.luma_mode);
    }
    let chroma_modes = search.recorder().unwrap().groups(TrialStage::ChromaMode);
    assert_eq!(chroma_modes.len(), 1);
    assert_eq!(chroma_modes[0].len(), 5);
}

#[test]
fn monochrome_blocks_have_no_chroma_decision() {
    let config = SearchConfig { chroma_format: ChromaFormat::Yuv400, ..Default::default() };
    let org = textured(16, 16, ChromaFormat::Yuv400, 2);
    let (decision, _) = run(config, CodingBlock::new(0, 0, 16), &org);
    assert_eq!(decision.chroma_mode, None);
    assert!(decision.chroma_tus.is_empty());
    assert_eq!(decision.chroma.frac_bits, 0);
}

#[test]
fn picture_search_matches_y4m_roundtrip() {
    let org = textured(32, 16, ChromaFormat::Yuv420, 17);
    let data = rdintra::y4m::write_y4m(std::slice::from_ref(&org));
    let frames = rdintra::y4m::read_y4m(&data).unwrap();
    assert_eq!(frames, vec![org.clone()]);

    let config = SearchConfig { max_block_size: 16, ..Default::default() };
    let mut search = IntraSearch::new(config).unwrap();
    let result = search_picture(&mut search, &frames[0]).unwrap();
    assert_eq!(result.blocks.len(), 2);
    assert_eq!(result.blocks[1].area, Area::square(16, 0, 16));
    assert!(result.summary.bits() > 0.0);
}
