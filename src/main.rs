use anyhow::{bail, Context, Result};
use std::io::{self, Write};
use std::path::PathBuf;

use skeleton_ed::config::Config;
use skeleton_ed::pose::{Landmark, Topology};
use skeleton_ed::video::FrameSource;
use skeleton_ed::{FillMode, MetadataIndex, Session, SourceMode};

const CONFIG_PATH: &str = "skeleton_ed.toml";

#[cfg(feature = "desktop")]
fn frame_source(_index: &MetadataIndex) -> Box<dyn FrameSource> {
    Box::new(skeleton_ed::video::OpenCvSource::new())
}

#[cfg(not(feature = "desktop"))]
fn frame_source(index: &MetadataIndex) -> Box<dyn FrameSource> {
    Box::new(skeleton_ed::video::StaticSource::from_index(index))
}

fn print_help() {
    println!("コマンド:");
    println!("  v [id|名前]       - 動画一覧 / 動画を選択");
    println!("  m [手法...]       - 手法一覧 / 融合に使う手法を選択");
    println!("  f N               - フレーム N へ移動");
    println!("  n / b             - 次 / 前のフレーム");
    println!("  nu / pu / fu      - 次 / 前 / 最初の未ラベルフレーム");
    println!("  s                 - 現在の骨格を表示 (ピクセル座標)");
    println!("  src               - 取得元を切り替え (saved / average)");
    println!("  c                 - 表示中の骨格をコミット");
    println!("  e i x y           - ポーズ i 番をピクセル座標 (x, y) に移動してコミット");
    println!("  fill prev|next|between - 前後の正解データから埋めてコミット");
    println!("  u / r             - undo / redo");
    println!("  play [N]          - N フレーム再生 (既定: 最後まで)");
    println!("  speed X           - 再生速度");
    println!("  rec               - 記録モードの切り替え");
    println!("  acc               - 手法ごとの信頼度");
    println!("  save [path] / load [path]");
    println!("  q                 - 終了");
}

fn show_status(session: &Session) -> Result<()> {
    let progress = session.progress()?;
    let labeled = session
        .ledger()
        .is_labeled(session.video_id().unwrap_or_default(), progress.current);
    println!(
        "Frame {} / {} ({} / {}) {} [{}] undo:{} redo:{}",
        progress.current,
        progress.total,
        progress.position,
        progress.duration,
        if labeled { "Labeled" } else { "Not labeled" },
        match session.source_mode() {
            SourceMode::Saved => "saved",
            SourceMode::Average => "average",
        },
        session.can_undo(),
        session.can_redo()
    );
    Ok(())
}

fn show_skeleton(session: &Session) -> Result<()> {
    let Some(skeleton) = session.current_skeleton(true)? else {
        println!("表示する骨格がありません (手法を選択してください)");
        return Ok(());
    };
    for (i, lm) in skeleton.pose.iter().enumerate() {
        println!("  pose[{:2}] ({:8.2}, {:8.2}) z={:6.3} vis={:.2}", i, lm.x, lm.y, lm.z, lm.score);
    }
    println!(
        "  pose: {}/{} connections",
        Topology::Pose.visible_connections(&skeleton.pose),
        Topology::Pose.connections().len()
    );
    for (side, points) in &skeleton.hands {
        let detected = points.iter().filter(|p| !p.is_zero()).count();
        println!(
            "  {} hand: {}/{} points, {}/{} connections",
            side,
            detected,
            points.len(),
            Topology::Hand.visible_connections(points),
            Topology::Hand.connections().len()
        );
    }
    Ok(())
}

fn edit_point(session: &mut Session, index: usize, x: f32, y: f32) -> Result<()> {
    let mut skeleton = session
        .current_skeleton(true)?
        .context("no skeleton to edit")?;
    let Some(lm) = skeleton.pose.get_mut(index) else {
        bail!("pose index {index} out of range");
    };
    *lm = Landmark::new(x, y, lm.z, lm.score);
    session.commit_pixel(&skeleton)?;
    Ok(())
}

fn run_command(session: &mut Session, parts: &[&str], project_path: &PathBuf) -> Result<bool> {
    match parts {
        ["v"] => {
            for id in session.index().list_videos() {
                let marker = if session.video_id() == Some(id) { "*" } else { " " };
                println!("{} {} ({})", marker, id, session.index().display_name(id));
            }
        }
        ["v", name] => {
            let id = session
                .index()
                .find_by_display_name(name)
                .unwrap_or(name)
                .to_string();
            let info = session.select_video(&id)?;
            println!(
                "{}: {} frames ({}), {}x{}",
                session.index().display_name(&id),
                info.frame_count,
                session.store().total_duration()?,
                info.width,
                info.height
            );
            println!("{}", session.progress()?);
            println!(
                "Available method(s) for this video: {}",
                session.store().current_methods().join(", ")
            );
        }
        ["m"] => {
            for method in session.store().current_methods() {
                let marker = if session.selected_methods().iter().any(|m| m == method) {
                    "x"
                } else {
                    " "
                };
                println!("[{}] {}", marker, method);
            }
        }
        ["m", methods @ ..] => session.set_selected_methods(methods.iter().copied())?,
        ["f", n] => session.set_frame(n.parse().context("invalid frame number")?)?,
        ["n"] => {
            if session.step_forward()?.is_none() {
                println!("Last frame reached");
            }
        }
        ["b"] => {
            if session.step_back()?.is_none() {
                println!("First frame reached");
            }
        }
        ["nu"] => {
            if session.next_unlabeled()?.is_none() {
                println!("All frames after this have been labeled");
            }
        }
        ["pu"] => {
            if session.previous_unlabeled()?.is_none() {
                println!("All frames before this have been labeled");
            }
        }
        ["fu"] => {
            if session.first_unlabeled()?.is_none() {
                println!("All frames have been labeled");
            }
        }
        ["s"] => show_skeleton(session)?,
        ["src"] => {
            if !session.toggle_source() {
                println!("このフレームには保存済みの骨格がありません");
            }
        }
        ["c"] => {
            let skeleton = session
                .current_skeleton(false)?
                .context("no skeleton to commit")?;
            session.commit(skeleton)?;
        }
        ["e", i, x, y] => {
            let index: usize = i.parse()?;
            let x: f32 = x.parse()?;
            let y: f32 = y.parse()?;
            edit_point(session, index, x, y)?;
        }
        ["fill", mode] => {
            let mode = match *mode {
                "prev" => FillMode::Previous,
                "next" => FillMode::Next,
                "between" => FillMode::Between,
                other => bail!("unknown fill mode: {other}"),
            };
            match session.fill_current(mode)? {
                Some(skeleton) => session.commit(skeleton)?,
                None => println!("近くに正解データがありません"),
            }
        }
        ["u"] => {
            if session.undo()?.is_none() {
                println!("Nothing to undo");
            }
        }
        ["r"] => {
            if session.redo()?.is_none() {
                println!("Nothing to redo");
            }
        }
        ["play", rest @ ..] => {
            let limit = match rest {
                [n] => n.parse().context("invalid frame count")?,
                _ => usize::MAX,
            };
            let interval = session.tick_interval().context("no video selected")?;
            session.play();
            let mut played = 0;
            while played < limit && session.tick()? {
                played += 1;
                std::thread::sleep(interval);
            }
            session.pause();
            println!("{} frames played", played);
        }
        ["speed", x] => session.set_speed(x.parse().context("invalid speed")?)?,
        ["rec"] => {
            let on = !session.is_recording();
            session.set_recording(on)?;
            println!("{}", if on { "(Recording)" } else { "記録を停止しました" });
        }
        ["acc"] => {
            for (method, confidence) in session.method_confidence()? {
                println!("  {:<16} {:6.2}%", method, confidence * 100.0);
            }
        }
        ["save", rest @ ..] => {
            let path = rest.first().map_or_else(|| project_path.clone(), PathBuf::from);
            session
                .save_project(&path)
                .with_context(|| format!("failed to save {}", path.display()))?;
            println!("保存しました: {}", path.display());
        }
        ["load", rest @ ..] => {
            let path = rest.first().map_or_else(|| project_path.clone(), PathBuf::from);
            session
                .load_project(&path)
                .with_context(|| format!("failed to load {}", path.display()))?;
            println!("読み込みました: {}", path.display());
        }
        ["h"] | ["help"] => print_help(),
        ["q"] => return Ok(false),
        [cmd, ..] => println!("不明なコマンド: {}", cmd),
        [] => {}
    }
    Ok(true)
}

fn main() -> Result<()> {
    let config = Config::load_or_default(CONFIG_PATH);
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&config.log.level))
        .init();

    println!("=== Skeleton Editor ({}) ===", env!("GIT_VERSION"));

    let metadata_path = config.metadata_path();
    let index = MetadataIndex::load(&metadata_path)
        .with_context(|| format!("failed to load {}", metadata_path.display()))?;
    println!(
        "{} videos, methods: {}",
        index.list_videos().len(),
        index.list_methods().join(", ")
    );
    println!();
    print_help();
    println!();

    let source = frame_source(&index);
    let mut session = Session::from_config(index, source, &config);
    let project_path = config.project.path.clone();
    if project_path.is_file() {
        session
            .load_project(&project_path)
            .with_context(|| format!("failed to load {}", project_path.display()))?;
    }

    loop {
        print!("> ");
        io::stdout().flush()?;

        let mut input = String::new();
        if io::stdin().read_line(&mut input)? == 0 {
            break;
        }
        let parts: Vec<&str> = input.split_whitespace().collect();

        match run_command(&mut session, &parts, &project_path) {
            Ok(true) => {
                if session.video_id().is_some() && !parts.is_empty() {
                    show_status(&session)?;
                }
            }
            Ok(false) => {
                println!("終了します");
                break;
            }
            Err(e) => println!("エラー: {:#}", e),
        }
    }

    Ok(())
}
