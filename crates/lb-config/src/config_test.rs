#[cfg(test)]
mod tests {
    use crate::test_fixtures::*;
    use crate::{BgpCommunity, ClusterResources, ConfigError, Validation, build_config};
    use crds::{BGPPeer, DynamicAsnMode, LabelSelector, SecretReference};
    use pretty_assertions::assert_eq;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use rand::seq::SliceRandom;
    use std::time::Duration;

    fn build(resources: ClusterResources) -> Result<crate::Config, ConfigError> {
        build_config(&resources.canonicalize(), Validation::DontValidate)
    }

    fn err_of(resources: ClusterResources, validation: Validation) -> String {
        build_config(&resources.canonicalize(), validation)
            .expect_err("configuration should be rejected")
            .to_string()
    }

    fn with_peer(mutate: impl FnOnce(&mut BGPPeer)) -> ClusterResources {
        let mut p = peer("p1", 64512, 64513, "10.0.0.1");
        mutate(&mut p);
        ClusterResources {
            peers: vec![p],
            ..Default::default()
        }
    }

    fn sample() -> ClusterResources {
        let mut adv = bgp_adv("adv-a", &["pool-a"]);
        adv.spec.communities = vec!["65000:100".to_string(), "no-export".to_string()];
        adv.spec.local_pref = Some(100);
        ClusterResources {
            pools: vec![
                pool("pool-a", &["10.0.0.0/24"]),
                pool("pool-b", &["10.0.1.0/24", "2001:db8::/120"]),
                pool("pool-c", &["192.168.0.10-192.168.0.20"]),
            ],
            peers: vec![
                peer("p1", 64512, 64513, "10.1.0.1"),
                peer("p2", 64512, 64514, "10.1.0.2"),
                peer("p3", 64512, 64515, "10.1.0.3"),
            ],
            bgp_advertisements: vec![adv, bgp_adv("adv-b", &["pool-b"])],
            l2_advertisements: vec![l2_adv("l2-a", &["pool-c"]), l2_adv("l2-b", &[])],
            communities: vec![community("aliases", &[("no-export", "65535:65281")])],
            nodes: vec![node("node-1", &[("zone", "a")]), node("node-2", &[("zone", "b")])],
            ..Default::default()
        }
    }

    #[test]
    fn test_build_is_independent_of_listing_order() {
        let expected = build(sample()).expect("sample is valid");
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..10 {
            let mut shuffled = sample();
            shuffled.pools.shuffle(&mut rng);
            shuffled.peers.shuffle(&mut rng);
            shuffled.bgp_advertisements.shuffle(&mut rng);
            shuffled.l2_advertisements.shuffle(&mut rng);
            shuffled.nodes.shuffle(&mut rng);
            assert_eq!(build(shuffled).expect("sample is valid"), expected);
        }
    }

    #[test]
    fn test_empty_resources_build_an_empty_config() {
        let config = build(ClusterResources::default()).expect("empty is valid");
        assert!(config.pools.is_empty());
        assert!(config.peers.is_empty());
    }

    #[test]
    fn test_overlapping_ranges_are_rejected() {
        let resources = ClusterResources {
            pools: vec![pool("a", &["1.1.1.1-1.1.1.100"]), pool("b", &["1.1.1.15-1.1.1.20"])],
            ..Default::default()
        };
        let err = err_of(resources, Validation::DontValidate);
        assert!(err.contains("overlaps with already defined CIDR"), "{err}");
        assert!(err.contains("pool \"b\""), "{err}");
    }

    #[test]
    fn test_disjoint_ranges_are_accepted() {
        let resources = ClusterResources {
            pools: vec![pool("a", &["1.1.1.1-1.1.1.100"]), pool("b", &["1.1.1.101-1.1.1.200"])],
            ..Default::default()
        };
        let config = build(resources).expect("disjoint ranges");
        let ip = "1.1.1.150".parse().expect("valid ip");
        assert_eq!(config.pools.pool_for(&ip).map(|p| p.name.as_str()), Some("b"));
    }

    #[test]
    fn test_duplicate_pool_names() {
        let resources = ClusterResources {
            pools: vec![pool("a", &["10.0.0.0/24"]), pool("a", &["10.0.1.0/24"])],
            ..Default::default()
        };
        assert_eq!(err_of(resources, Validation::DontValidate), "duplicate definition of pool \"a\"");
    }

    #[test]
    fn test_invalid_cidr() {
        let resources = ClusterResources {
            pools: vec![pool("a", &["10.0.0.0/33"])],
            ..Default::default()
        };
        let err = err_of(resources, Validation::DontValidate);
        assert!(err.starts_with("invalid CIDR \"10.0.0.0/33\" in pool \"a\""), "{err}");
    }

    #[test]
    fn test_pool_defaults_and_sizes() {
        let config = build(sample()).expect("sample is valid");
        let pool_b = config.pools.get("pool-b").expect("pool-b");
        assert!(pool_b.auto_assign);
        assert_eq!(pool_b.size(crate::IpFamily::V4), 256);
        assert_eq!(pool_b.size(crate::IpFamily::V6), 256);
        assert_eq!(config.pools.get("pool-c").expect("pool-c").size(crate::IpFamily::V4), 11);
    }

    #[test]
    fn test_peer_defaults() {
        let config = build(with_peer(|_| {})).expect("valid peer");
        let p = &config.peers["p1"];
        assert_eq!(p.port, 179);
        assert_eq!(p.addr, Some("10.0.0.1".parse().expect("valid ip")));
        assert_eq!(p.hold_time, None);
        assert_eq!(p.vrf, "");
    }

    #[test]
    fn test_peer_timer_defaults() {
        let config = build(with_peer(|p| p.spec.hold_time = Some("90s".to_string()))).expect("valid");
        assert_eq!(config.peers["p1"].keepalive_time, Some(Duration::from_secs(30)));

        let config = build(with_peer(|p| p.spec.keepalive_time = Some("10s".to_string()))).expect("valid");
        assert_eq!(config.peers["p1"].hold_time, Some(Duration::from_secs(30)));

        let config = build(with_peer(|p| p.spec.hold_time = Some("0".to_string()))).expect("valid");
        assert_eq!(config.peers["p1"].hold_time, Some(Duration::ZERO));
    }

    #[test]
    fn test_peer_timer_errors() {
        let err = err_of(with_peer(|p| p.spec.hold_time = Some("2s".to_string())), Validation::DontValidate);
        assert!(err.contains("must be 0 or >=3s"), "{err}");

        let err = err_of(
            with_peer(|p| {
                p.spec.hold_time = Some("30s".to_string());
                p.spec.keepalive_time = Some("60s".to_string());
            }),
            Validation::DontValidate,
        );
        assert!(err.contains("must be lower than holdTime"), "{err}");

        let err = err_of(with_peer(|p| p.spec.hold_time = Some("soon".to_string())), Validation::DontValidate);
        assert!(err.starts_with("parsing peer p1: invalid hold time"), "{err}");
    }

    #[test]
    fn test_peer_structural_errors() {
        let err = err_of(with_peer(|p| p.spec.my_asn = 0), Validation::DontValidate);
        assert_eq!(err, "parsing peer p1: missing local ASN");

        let err = err_of(with_peer(|p| p.spec.peer_asn = 0), Validation::DontValidate);
        assert_eq!(err, "parsing peer p1: missing peer ASN");

        let err = err_of(
            with_peer(|p| p.spec.dynamic_asn = Some(DynamicAsnMode::External)),
            Validation::DontValidate,
        );
        assert_eq!(err, "parsing peer p1: both peerASN and dynamicASN are set");

        let err = err_of(with_peer(|p| p.spec.peer_address = "nowhere".to_string()), Validation::DontValidate);
        assert_eq!(err, "parsing peer p1: invalid peer IP \"nowhere\"");
    }

    #[test]
    fn test_unnumbered_peer() {
        let config = build(with_peer(|p| {
            p.spec.peer_address = String::new();
            p.spec.interface = Some("eth1".to_string());
        }))
        .expect("valid");
        assert_eq!(config.peers["p1"].addr, None);
        assert_eq!(config.peers["p1"].iface.as_deref(), Some("eth1"));
    }

    #[test]
    fn test_missing_bfd_profile() {
        let err = err_of(with_peer(|p| p.spec.bfd_profile = Some("fast".to_string())), Validation::DontValidate);
        assert_eq!(err, "peer p1 referencing non existing bfd profile fast");
    }

    #[test]
    fn test_bfd_profile_ranges() {
        let mut profile = bfd_profile("fast");
        profile.spec.detect_multiplier = Some(1);
        let resources = ClusterResources {
            bfd_profiles: vec![profile],
            ..Default::default()
        };
        let err = err_of(resources, Validation::DontValidate);
        assert!(err.contains("invalid detect multiplier 1: must be between 2 and 255"), "{err}");
    }

    #[test]
    fn test_password_from_secret_is_resolved_and_redacted() {
        let mut resources = with_peer(|p| {
            p.spec.password_secret = Some(SecretReference {
                name: "bgp-auth".to_string(),
                namespace: Some(TEST_NAMESPACE.to_string()),
            });
        });
        resources
            .password_secrets
            .insert("bgp-auth".to_string(), secret("bgp-auth", "s3cr3t"));
        let config = build(resources).expect("valid");
        assert_eq!(config.peers["p1"].password.expose(), "s3cr3t");
        assert!(!config.dump().contains("s3cr3t"));
        assert!(config.dump().contains("<retracted>"));
    }

    #[test]
    fn test_password_secret_errors() {
        let secret_ref = SecretReference {
            name: "bgp-auth".to_string(),
            namespace: None,
        };

        let missing = with_peer(|p| p.spec.password_secret = Some(secret_ref.clone()));
        let err = err_of(missing, Validation::DontValidate);
        assert!(err.contains("secret ref not found"), "{err}");

        let mut wrong_type = with_peer(|p| p.spec.password_secret = Some(secret_ref.clone()));
        let mut opaque = secret("bgp-auth", "s3cr3t");
        opaque.type_ = Some("Opaque".to_string());
        wrong_type.password_secrets.insert("bgp-auth".to_string(), opaque);
        let err = err_of(wrong_type, Validation::DontValidate);
        assert!(err.contains("secret type mismatch"), "{err}");

        let both = with_peer(|p| {
            p.spec.password = Some("plain".to_string());
            p.spec.password_secret = Some(secret_ref.clone());
        });
        let err = err_of(both, Validation::DontValidate);
        assert!(err.contains("can not have both password and secret ref"), "{err}");
    }

    #[test]
    fn test_identical_peers_are_duplicates() {
        let resources = ClusterResources {
            peers: vec![peer("p2", 64512, 64513, "10.0.0.1"), peer("p1", 64512, 64513, "10.0.0.1")],
            ..Default::default()
        };
        assert_eq!(err_of(resources, Validation::DontValidate), "peer p2 already exists");
    }

    #[test]
    fn test_community_aliases() {
        let config = build(sample()).expect("sample is valid");
        let adv = &config.pools.get("pool-a").expect("pool-a").bgp_advertisements[0];
        assert_eq!(adv.local_pref, 100);
        assert!(adv.communities.contains(&"65535:65281".parse::<BgpCommunity>().expect("valid")));
        assert!(adv.communities.contains(&BgpCommunity::Legacy((65000 << 16) + 100)));
    }

    #[test]
    fn test_duplicate_community_alias() {
        let resources = ClusterResources {
            communities: vec![
                community("a", &[("no-export", "65535:65281")]),
                community("b", &[("no-export", "65535:65282")]),
            ],
            ..Default::default()
        };
        assert_eq!(
            err_of(resources, Validation::DontValidate),
            "duplicate definition of community \"no-export\""
        );
    }

    #[test]
    fn test_duplicate_community_in_advertisement() {
        let mut resources = sample();
        resources.bgp_advertisements[0].spec.communities =
            vec!["65535:65281".to_string(), "no-export".to_string()];
        let err = err_of(resources, Validation::DontValidate);
        assert!(err.contains("duplicate definition of community \"no-export\""), "{err}");
    }

    #[test]
    fn test_aggregation_length_against_range() {
        let mut adv = bgp_adv("adv", &["pool"]);
        adv.spec.aggregation_length = Some(24);
        let resources = ClusterResources {
            pools: vec![pool("pool", &["3.3.3.2-3.3.3.254"])],
            bgp_advertisements: vec![adv.clone()],
            ..Default::default()
        };
        let err = err_of(resources.clone(), Validation::DontValidate);
        assert!(err.contains("invalid aggregation length 24: prefix 26"), "{err}");

        let mut ok = resources;
        ok.bgp_advertisements[0].spec.aggregation_length = Some(26);
        let config = build(ok).expect("valid aggregation");
        let adv = &config.pools.get("pool").expect("pool").bgp_advertisements[0];
        assert_eq!((adv.aggregation_length, adv.aggregation_length_v6), (26, 128));
    }

    #[test]
    fn test_advertisement_references() {
        let mut resources = sample();
        resources.bgp_advertisements[0].spec.ip_address_pools = vec!["nope".to_string()];
        let err = err_of(resources, Validation::DontValidate);
        assert_eq!(err, "parsing bgp advertisement \"adv-a\": pool \"nope\" not found");
    }

    #[test]
    fn test_advertisement_without_pools_selects_all_pools() {
        let config = build(sample()).expect("sample is valid");
        for name in ["pool-a", "pool-b", "pool-c"] {
            let pool = config.pools.get(name).expect("pool");
            assert!(pool.l2_advertisements.iter().any(|a| a.name == "l2-b"), "{name}");
        }
        let l2 = &config.pools.get("pool-c").expect("pool-c").l2_advertisements;
        assert_eq!(l2.iter().map(|a| a.name.as_str()).collect::<Vec<_>>(), vec!["l2-a", "l2-b"]);
        assert!(l2[0].all_interfaces);
    }

    #[test]
    fn test_node_selectors_on_advertisement() {
        let mut resources = sample();
        resources.bgp_advertisements[0].spec.node_selectors = vec![LabelSelector::with_label("zone", "a")];
        let config = build(resources).expect("valid");
        let adv = &config.pools.get("pool-a").expect("pool-a").bgp_advertisements[0];
        assert_eq!(adv.nodes.iter().cloned().collect::<Vec<_>>(), vec!["node-1".to_string()]);

        let adv_b = &config.pools.get("pool-b").expect("pool-b").bgp_advertisements[0];
        assert_eq!(adv_b.nodes.len(), 2);
    }

    #[test]
    fn test_legacy_pools() {
        let mut l2_with_bgp = legacy_pool("bad", "layer2", &["10.9.0.0/24"]);
        l2_with_bgp.spec.bgp_advertisements = vec![Default::default()];
        let resources = ClusterResources {
            legacy_pools: vec![l2_with_bgp],
            ..Default::default()
        };
        let err = err_of(resources, Validation::DontValidate);
        assert!(err.contains("cannot have bgp-advertisements"), "{err}");

        let resources = ClusterResources {
            legacy_pools: vec![
                legacy_pool("l2", "layer2", &["10.9.0.0/24"]),
                legacy_pool("bgp", "bgp", &["10.9.1.0/24"]),
            ],
            nodes: vec![node("node-1", &[])],
            ..Default::default()
        };
        let config = build(resources).expect("valid legacy pools");
        assert!(config.pools.get("l2").expect("l2").l2_advertisements[0].all_interfaces);
        let bgp = &config.pools.get("bgp").expect("bgp").bgp_advertisements;
        assert_eq!(bgp.len(), 1);
        assert_eq!(bgp[0].aggregation_length, 32);
    }

    #[test]
    fn test_legacy_pool_overlaps_with_new_pool() {
        let resources = ClusterResources {
            pools: vec![pool("new", &["10.9.0.0/16"])],
            legacy_pools: vec![legacy_pool("old", "layer2", &["10.9.0.0/24"])],
            ..Default::default()
        };
        let err = err_of(resources, Validation::DontValidate);
        assert!(err.contains("overlaps with already defined CIDR \"10.9.0.0/16\""), "{err}");
    }

    #[test]
    fn test_validation_for_bgp_type() {
        assert_eq!(Validation::for_bgp_type("frr"), Validation::DiscardNativeOnly);
        assert_eq!(Validation::for_bgp_type("frr-k8s"), Validation::DiscardNativeOnly);
        assert_eq!(Validation::for_bgp_type("native"), Validation::DiscardFrrOnly);
        assert_eq!(Validation::for_bgp_type(""), Validation::DontValidate);
    }

    #[test]
    fn test_native_mode_rejects_frr_only_fields() {
        let err = err_of(with_peer(|p| p.spec.vrf = Some("red".to_string())), Validation::DiscardFrrOnly);
        assert_eq!(err, "peer p1 has vrf set on native bgp mode");

        let resources = ClusterResources {
            bfd_profiles: vec![bfd_profile("fast")],
            ..Default::default()
        };
        assert_eq!(err_of(resources, Validation::DiscardFrrOnly), "bfd profiles section set");

        let err = err_of(sample(), Validation::DiscardFrrOnly);
        assert_eq!(
            err,
            "pool \"pool-b\" has ipv6 CIDR 2001:db8::/120, native bgp mode does not support ipv6"
        );
    }

    #[test]
    fn test_native_mode_keepalive_only_rejected_when_nonzero() {
        let err = err_of(
            with_peer(|p| p.spec.keepalive_time = Some("10s".to_string())),
            Validation::DiscardFrrOnly,
        );
        assert_eq!(err, "peer p1 has keepalive-time set on native bgp mode");

        for zero in ["0", "0s"] {
            let resources = with_peer(|p| {
                p.spec.hold_time = Some("0s".to_string());
                p.spec.keepalive_time = Some(zero.to_string());
            });
            let config = build_config(&resources.canonicalize(), Validation::DiscardFrrOnly)
                .expect("an explicit zero keepalive is not an FRR-only setting");
            assert_eq!(config.peers["p1"].keepalive_time, Some(Duration::ZERO));
        }
    }

    #[test]
    fn test_native_mode_rejects_large_communities() {
        let mut adv = bgp_adv("adv", &[]);
        adv.spec.communities = vec!["large:1:2:3".to_string()];
        let resources = ClusterResources {
            pools: vec![pool("pool", &["10.0.0.0/24"])],
            bgp_advertisements: vec![adv],
            ..Default::default()
        };
        let err = err_of(resources.clone(), Validation::DiscardFrrOnly);
        assert!(err.contains("has non legacy community \"large:1:2:3\""), "{err}");
        build(resources).expect("large communities are fine without policy");
    }

    #[test]
    fn test_frr_mode_router_id_and_asn() {
        let mut a = peer("a", 64512, 64513, "10.0.0.1");
        a.spec.router_id = Some("10.0.0.100".to_string());
        let b = peer("b", 64512, 64514, "10.0.0.2");
        let resources = ClusterResources {
            peers: vec![a, b],
            ..Default::default()
        };
        assert_eq!(
            err_of(resources, Validation::DiscardNativeOnly),
            "peer b has RouterID different from a, in FRR mode all RouterID must be equal"
        );

        let resources = ClusterResources {
            peers: vec![peer("a", 64512, 64513, "10.0.0.1"), peer("b", 64600, 64514, "10.0.0.2")],
            ..Default::default()
        };
        assert_eq!(
            err_of(resources, Validation::DiscardNativeOnly),
            "peer b has myAsn different from a, in FRR mode all myAsn must be equal for the same VRF"
        );
    }

    #[test]
    fn test_frr_mode_duplicate_peers_need_node_selectors() {
        let resources = ClusterResources {
            peers: vec![peer("a", 64512, 64513, "10.0.0.1"), peer("b", 64512, 64514, "10.0.0.1")],
            ..Default::default()
        };
        let err = err_of(resources, Validation::DiscardNativeOnly);
        assert!(err.starts_with("duplicate peer a has no nodeSelectors"), "{err}");

        let mut a = peer("a", 64512, 64513, "10.0.0.1");
        let mut b = peer("b", 64512, 64514, "10.0.0.1");
        a.spec.node_selectors = vec![LabelSelector::with_label("zone", "a")];
        b.spec.node_selectors = vec![LabelSelector::with_label("rack", "1")];
        let resources = ClusterResources {
            peers: vec![a.clone(), b.clone()],
            ..Default::default()
        };
        let err = err_of(resources, Validation::DiscardNativeOnly);
        assert!(err.starts_with("duplicate peers with address/interface 10.0.0.1 might select the same nodes"), "{err}");

        b.spec.node_selectors = vec![LabelSelector::with_label("zone", "b")];
        let resources = ClusterResources {
            peers: vec![a, b],
            ..Default::default()
        };
        build_config(&resources.canonicalize(), Validation::DiscardNativeOnly).expect("disjoint selectors");
    }

    #[test]
    fn test_bfd_echo_with_ipv6_pool() {
        let mut profile = bfd_profile("echo");
        profile.spec.echo_mode = Some(true);
        let mut p = peer("p1", 64512, 64513, "10.0.0.1");
        p.spec.bfd_profile = Some("echo".to_string());
        let resources = ClusterResources {
            pools: vec![pool("v6", &["2001:db8::/120"])],
            peers: vec![p],
            bfd_profiles: vec![profile],
            bgp_advertisements: vec![bgp_adv("adv", &["v6"])],
            ..Default::default()
        };
        assert_eq!(
            err_of(resources, Validation::DontValidate),
            "pool v6 has bgpadvertisement adv which references peer p1 which has bfd echo enabled, which is not possible"
        );
    }
}
