use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;

/// Pool-analytics commands.
///
/// GREEN when:
/// - `yd rate` fills strategy_rating = rating / avg(token tiers) / scale and
///   reports pools it could not rate
/// - `ratings.scale` from config changes the divisor
/// - `yd il` prints the position's impermanent loss
/// - `yd depeg` signals only the price that falls >1% under its window average

#[test]
fn rate_writes_strategy_ratings() {
    let dir = tempfile::tempdir().unwrap();
    let pools = dir.path().join("pools.csv");
    let tokens = dir.path().join("tokens.csv");
    let out = dir.path().join("rated.csv");
    fs::write(
        &pools,
        "pool_id,protocol_name,token1,token2,chain,rating\n\
         p1,aave,USDC,ETH,Base,20000000\n\
         p2,curve,DAI,FOO,Ethereum,5\n",
    )
    .unwrap();
    fs::write(
        &tokens,
        "token,chain,tier\nUSDC,Base,1\nETH,base,3\nDAI,Ethereum,1\n",
    )
    .unwrap();

    Command::cargo_bin("yd")
        .unwrap()
        .arg("rate")
        .arg("--pools")
        .arg(&pools)
        .arg("--tokens")
        .arg(&tokens)
        .arg("--out")
        .arg(&out)
        .assert()
        .success()
        .stdout(predicate::str::contains("rated=1 skipped=1 token_tiers=3"))
        .stdout(predicate::str::contains("skip row=1 reason=missing or zero token tier for FOO-ETHEREUM"));

    let rated = yd_pools::parse_pools_csv_file(&out).unwrap();
    assert_eq!(rated.len(), 2);
    // 2e7 / avg(1, 3) / 1e7
    assert_eq!(rated[0].strategy_rating.as_deref(), Some("1"));
    assert_eq!(rated[1].strategy_rating, None);
}

#[test]
fn rate_scale_comes_from_config() {
    let dir = tempfile::tempdir().unwrap();
    let pools = dir.path().join("pools.csv");
    let tokens = dir.path().join("tokens.csv");
    let cfg = dir.path().join("ratings.yaml");
    let out = dir.path().join("rated.csv");
    fs::write(&pools, "protocol_name,token1,token2,chain,rating\naave,USDC,USDC,Base,300\n").unwrap();
    fs::write(&tokens, "token,chain,tier\nUSDC,Base,2\n").unwrap();
    fs::write(&cfg, "ratings:\n  scale: 10\n").unwrap();

    Command::cargo_bin("yd")
        .unwrap()
        .arg("rate")
        .arg("--pools")
        .arg(&pools)
        .arg("--tokens")
        .arg(&tokens)
        .arg("--out")
        .arg(&out)
        .arg("--config")
        .arg(&cfg)
        .arg("--strict-config")
        .assert()
        .success()
        .stdout(predicate::str::contains("scale=10"));

    let rated = yd_pools::parse_pools_csv_file(&out).unwrap();
    assert_eq!(rated[0].strategy_rating.as_deref(), Some("15"));
}

#[test]
fn il_reports_loss_net_of_fees() {
    Command::cargo_bin("yd")
        .unwrap()
        .args([
            "il",
            "--token1-before",
            "1",
            "--token1-after",
            "0.8",
            "--token2-before",
            "2000",
            "--token2-after",
            "2380",
            "--price1",
            "2000",
            "--price2",
            "1",
            "--fee",
            "5",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("impermanent_loss=-15.000000"))
        .stdout(predicate::str::contains("loss=true"));
}

#[test]
fn il_rejects_zero_price() {
    Command::cargo_bin("yd")
        .unwrap()
        .args([
            "il",
            "--token1-before",
            "1",
            "--token1-after",
            "1",
            "--token2-before",
            "1",
            "--token2-after",
            "1",
            "--price1",
            "0",
            "--price2",
            "1",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("IL_INPUT_INVALID"));
}

#[test]
fn depeg_flags_only_the_drop() {
    Command::cargo_bin("yd")
        .unwrap()
        .args([
            "depeg",
            "--pair",
            "USDC/USDT",
            "--prices",
            "1,1,1,1,1,1,1,1,1,0.97,1",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("depeg index=9 pair=USDC/USDT price=0.97"))
        .stdout(predicate::str::contains("observations=11 depeg_signals=1"));
}
