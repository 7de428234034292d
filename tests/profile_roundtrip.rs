//! Script line → INI section → loaded profile.

use std::path::Path;

use dpi_core::command_builder::{build_section, HostlistMethod};
use dpi_core::config::placeholders::PlaceholderTable;
use dpi_core::config::ConfigStore;

const BAT_LINE: &str = "start \"zapret: discord\" /min \"%BIN%winws.exe\" --wf-tcp=443 --wf-udp=443,50000-65535 ^\n\
--filter-udp=443 --hostlist=\"%LISTS%list-discord.txt\" --dpi-desync=fake \
--dpi-desync-fake-quic=\"%BIN%quic_initial_www_google_com.bin\" --new ^\n\
--filter-tcp=443 --hostlist-domains=discord.media --dpi-desync=split";

#[test]
fn built_section_loads_back_as_expected_profile() {
    let base = Path::new("/opt/dpi");
    let table = PlaceholderTable::new(base);

    let section = build_section(BAT_LINE, "discord", HostlistMethod::Discord);
    let ini = format!("[SCRIPT_OPTIONS]\n\n{}", section);
    let set = ConfigStore::new(&table).load_str(&ini, None).unwrap();

    assert_eq!(set.names(), vec!["discord"]);
    let profile = set.get("discord").unwrap();

    let zapret = base.join("zapret");
    let discord_list = base.join("black").join("discord-blacklist.txt");
    assert_eq!(profile.executable, zapret.join("winws.exe"));
    assert_eq!(
        profile.args,
        vec![
            "--wf-tcp=443".to_string(),
            "--wf-udp=443,50000-65535".to_string(),
            "--filter-udp=443".to_string(),
            format!("--hostlist={}", discord_list.display()),
            "--dpi-desync=fake".to_string(),
            format!(
                "--dpi-desync-fake-quic={}/quic_initial_www_google_com.bin",
                zapret.display()
            ),
            "--new".to_string(),
            "--filter-tcp=443".to_string(),
            "--hostlist-domains=discord.media".to_string(),
            "--dpi-desync=split".to_string(),
        ]
    );
    assert!(profile.args.iter().all(|a| !a.contains('{')));
}

#[test]
fn sample_profile_file_loads() {
    let table = PlaceholderTable::new(Path::new("/opt/dpi"));
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("config").join("default.ini");
    let set = ConfigStore::new(&table).load(&path).unwrap();

    assert_eq!(set.names(), vec!["general", "discord", "stop_windivert"]);
    for profile in set.iter() {
        assert!(!profile.args.is_empty());
        assert!(profile
            .args
            .iter()
            .chain(std::iter::once(&profile.executable.display().to_string()))
            .all(|a| !a.contains('{')));
    }
    assert_eq!(set.get("stop_windivert").unwrap().args, vec!["stop", "WinDivert"]);
}
