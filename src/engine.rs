// src/engine.rs
// ---------------------------------------------------------------------------
//  • Trait Engine: capacidade abstrata de análise (o solver nunca vê UCI)
//  • UciEngine: adaptador sobre subprocesso UCI via ruci
//  • SetOption/MultiPV diferenciais (reenvia só o que mudou)
//  • Timeout em todas as idas e vindas com o subprocesso
// ---------------------------------------------------------------------------

use std::{
    borrow::Cow,
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use anyhow::{anyhow, Context, Result};
use futures_util::future::ready;
use indexmap::IndexMap;
use log::trace;
use ruci::{
    engine::{Info, Score as RuciScore},
    gui::{traits::Message as UciMessage, Go, IsReady, Position as UciPosition, Quit, SetOption},
    Engine as RuciEngine,
};
use serde::{Deserialize, Serialize};
use shakmaty::{fen::Fen, Chess, EnPassantMode, Move, Position};
use tokio::{
    io::BufReader,
    process::{Child, ChildStdin, ChildStdout, Command},
    time::timeout,
};

use crate::score::Score;

// ---------------------------------------------------------------------------
// Constantes
// ---------------------------------------------------------------------------
const DEFAULT_TIMEOUT_MS: u64 = 10_000;
const ANALYSIS_FACTOR: u64 = 2;
const DEFAULT_DEPTH_BUDGET: u32 = 60;

// ---------------------------------------------------------------------------
// Tipos públicos
// ---------------------------------------------------------------------------

/// Limite de busca de uma única análise. Igualdade campo a campo; os campos
/// de relógio participam da configuração mas não são encaminhados ao `go`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limit {
    pub depth: Option<u32>,
    pub nodes: Option<u64>,
    pub time: Option<f64>,
    pub mate: Option<u32>,
    pub white_clock: Option<f64>,
    pub black_clock: Option<f64>,
    pub white_inc: Option<f64>,
    pub black_inc: Option<f64>,
    pub remaining_moves: Option<u32>,
}

impl Limit {
    pub fn depth(depth: u32) -> Self {
        Limit {
            depth: Some(depth),
            ..Limit::default()
        }
    }

    pub fn nodes(nodes: u64) -> Self {
        Limit {
            nodes: Some(nodes),
            ..Limit::default()
        }
    }
}

/// Configuração completa de uma chamada de análise: limite, multipv e
/// opções UCI repassadas sem interpretação.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConf {
    pub limit: Limit,
    pub multipv: Option<u32>,
    pub options: IndexMap<String, String>,
}

/// Resultado de um slot multi-PV: pontuação relativa a quem joga e a
/// variante principal já convertida em lances.
#[derive(Debug, Clone)]
pub struct AnalysisInfo {
    pub score: Option<Score>,
    pub depth: Option<u8>,
    pub seldepth: Option<u8>,
    pub nodes: Option<u64>,
    pub multipv: Option<u32>,
    pub pv: Vec<Move>,
}

/// Capacidade de análise consumida pelo solver. Testes injetam um motor
/// roteirizado; produção usa `UciEngine`.
pub trait Engine {
    async fn analyse(&mut self, board: &Chess, conf: &SearchConf) -> Result<Vec<AnalysisInfo>>;
    async fn quit(&mut self) -> Result<()>;
}

// ---------------------------------------------------------------------------
// UciEngine
// ---------------------------------------------------------------------------
pub struct UciEngine {
    inner: RuciEngine<BufReader<ChildStdout>, ChildStdin>,
    child: Child,
    timeout_ms: u64,
    current_mpv: u32,
    current_options: IndexMap<String, String>,
}

impl UciEngine {
    // ---------- criação ----------
    pub async fn spawn(path: &str) -> Result<Self> {
        let mut child = Command::new(path)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::null())
            .spawn()
            .with_context(|| format!("Falha ao executar '{path}'"))?;

        let stdout = child.stdout.take().ok_or_else(|| anyhow!("stdout indisponível"))?;
        let stdin = child.stdin.take().ok_or_else(|| anyhow!("stdin indisponível"))?;

        let mut inner = RuciEngine {
            engine: BufReader::new(stdout),
            gui: stdin,
            strict: false,
        };
        timeout(
            Duration::from_millis(DEFAULT_TIMEOUT_MS),
            inner.use_uci_async(|_| ready(())),
        )
        .await??;

        let mut engine = Self {
            inner,
            child,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            current_mpv: 1,
            current_options: IndexMap::new(),
        };
        engine.ready().await?;
        Ok(engine)
    }

    // ---------- internos ----------
    async fn send<C>(&mut self, cmd: C) -> Result<()>
    where
        C: UciMessage + std::fmt::Debug + Send + 'static,
    {
        trace!("› {:?}", cmd);
        timeout(Duration::from_millis(self.timeout_ms), self.inner.send_async(cmd)).await??;
        Ok(())
    }

    async fn ready(&mut self) -> Result<()> {
        self.send(IsReady).await?;
        timeout(Duration::from_millis(self.timeout_ms), self.inner.is_ready_async()).await??;
        Ok(())
    }

    async fn set_position(&mut self, board: &Chess) -> Result<()> {
        let fen = Fen::from_position(board.clone(), EnPassantMode::Legal);
        self.send(UciPosition::Fen {
            fen: Cow::Owned(fen),
            moves: Cow::Owned(Vec::new()),
        })
        .await?;
        self.ready().await
    }

    async fn ensure_mpv(&mut self, mpv: u32) -> Result<()> {
        if mpv == self.current_mpv {
            return Ok(());
        }
        self.send(SetOption {
            name: Cow::Borrowed("MultiPV"),
            value: Some(Cow::Owned(mpv.to_string())),
        })
        .await?;
        self.ready().await?;
        self.current_mpv = mpv;
        Ok(())
    }

    async fn ensure_options(&mut self, options: &IndexMap<String, String>) -> Result<()> {
        let pending: Vec<(String, String)> = options
            .iter()
            .filter(|(name, value)| self.current_options.get(*name) != Some(*value))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        if pending.is_empty() {
            return Ok(());
        }

        for (name, value) in pending {
            self.send(SetOption {
                name: Cow::Owned(name.clone()),
                value: Some(Cow::Owned(value.clone())),
            })
            .await?;
            self.current_options.insert(name, value);
        }
        self.ready().await
    }

    fn analysis_budget(&self, limit: &Limit) -> Duration {
        match limit.time {
            Some(t) => Duration::from_secs_f64(t) + Duration::from_millis(self.timeout_ms),
            None => Duration::from_millis(
                self.timeout_ms
                    * ANALYSIS_FACTOR
                    * u64::from(limit.depth.unwrap_or(DEFAULT_DEPTH_BUDGET)),
            ),
        }
    }
}

impl Engine for UciEngine {
    // ---------- análise ----------
    async fn analyse(&mut self, board: &Chess, conf: &SearchConf) -> Result<Vec<AnalysisInfo>> {
        self.ensure_options(&conf.options).await?;
        self.ensure_mpv(conf.multipv.unwrap_or(1)).await?;
        self.set_position(board).await?;

        let go = Go {
            depth: conf.limit.depth.map(|d| d as usize),
            nodes: conf.limit.nodes.map(|n| n as usize),
            mate: conf.limit.mate.map(|m| m as usize),
            move_time: conf.limit.time.map(|t| (t * 1000.0) as usize),
            ..Default::default()
        };

        let map: Arc<Mutex<HashMap<u32, AnalysisInfo>>> = Arc::new(Mutex::new(HashMap::new()));
        let cb = map.clone();
        let root = board.clone();

        timeout(
            self.analysis_budget(&conf.limit),
            self.inner.go_async(&go, move |info: Info| {
                if info.score.is_some() && !info.pv.is_empty() {
                    let slot = info.multi_pv.unwrap_or(1) as u32;
                    cb.lock().unwrap().insert(slot, convert_info(&info, &root));
                }
                ready(())
            }),
        )
        .await??;

        let mut slots: Vec<(u32, AnalysisInfo)> = Arc::try_unwrap(map)
            .map_err(|_| anyhow!("análise ainda referenciada"))?
            .into_inner()
            .unwrap()
            .into_iter()
            .collect();
        slots.sort_by_key(|(slot, _)| *slot);
        Ok(slots.into_iter().map(|(_, info)| info).collect())
    }

    async fn quit(&mut self) -> Result<()> {
        let _ = self.send(Quit).await;
        let _ = timeout(Duration::from_millis(1_000), self.child.wait()).await;
        Ok(())
    }
}

impl Drop for UciEngine {
    fn drop(&mut self) {
        let _ = self.child.start_kill();
    }
}

// ---------------------------------------------------------------------------
//  Conversão Info → AnalysisInfo
// ---------------------------------------------------------------------------
fn convert_info(src: &Info, board: &Chess) -> AnalysisInfo {
    let score = src.score.as_ref().map(|s| match &s.kind {
        RuciScore::Centipawns(cp) => Score::Cp(*cp as i32),
        RuciScore::MateIn(m) => Score::Mate(*m as i32),
    });
    let depth = src.depth.map(|d| d.depth as u8);
    let seldepth = src.depth.and_then(|d| d.seldepth.map(|s| s as u8));
    let nodes = src.nodes.map(|n| n as u64);
    let multipv = src.multi_pv.map(|id| id as u32);

    // A PV chega em UCI; um tabuleiro de rascunho avança lance a lance para
    // converter cada um no contexto certo.
    let mut scratch = board.clone();
    let mut pv = Vec::with_capacity(src.pv.len());
    for uci in src.pv.iter() {
        match uci.to_move(&scratch) {
            Ok(mv) => {
                scratch.play_unchecked(&mv);
                pv.push(mv);
            }
            Err(_) => break,
        }
    }

    AnalysisInfo {
        score,
        depth,
        seldepth,
        nodes,
        multipv,
        pv,
    }
}

// ---------------------------------------------------------------------------
// Testes
// ---------------------------------------------------------------------------
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_equality_is_field_wise() {
        assert_eq!(Limit::depth(29), Limit::depth(29));
        assert_ne!(Limit::depth(29), Limit::depth(28));
        assert_ne!(Limit::depth(29), Limit::nodes(10_000_000));
        assert_ne!(
            Limit::depth(29),
            Limit {
                depth: Some(29),
                white_clock: Some(60.0),
                ..Limit::default()
            }
        );
    }

    #[test]
    fn search_conf_defaults_are_single_pv() {
        let conf = SearchConf::default();
        assert_eq!(conf.multipv, None);
        assert!(conf.options.is_empty());
        assert_eq!(conf.limit, Limit::default());
    }

    #[test]
    fn search_conf_deserializes_partial_json() {
        let conf: SearchConf = serde_json::from_str(
            r#"{"limit": {"depth": 13}, "multipv": 3, "options": {"Threads": "8"}}"#,
        )
        .unwrap();
        assert_eq!(conf.limit, Limit::depth(13));
        assert_eq!(conf.multipv, Some(3));
        assert_eq!(conf.options.get("Threads").map(String::as_str), Some("8"));
    }
}
