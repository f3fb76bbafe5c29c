//! Analysis pipeline: fetch, summarize, persist
//!
//! Each step runs only after the previous one succeeded. A fetch failure means
//! no generation request and no insert; only the comments fetch inside the
//! fetcher is allowed to degrade.

use std::sync::Arc;

use bilisum_core::{
    generator::PromptLimits, Analysis, AnalysisStore, BilibiliClient, BilisumConfig,
    BilisumError, GeminiClient, NewAnalysis, SummaryGenerator,
};

pub struct AnalysisPipeline {
    fetcher: BilibiliClient,
    generator: SummaryGenerator,
    store: Arc<dyn AnalysisStore>,
}

impl AnalysisPipeline {
    pub fn new(
        fetcher: BilibiliClient,
        generator: SummaryGenerator,
        store: Arc<dyn AnalysisStore>,
    ) -> Self {
        Self {
            fetcher,
            generator,
            store,
        }
    }

    /// Build the Bilibili and Gemini clients from config around an existing store.
    pub fn from_config(
        config: &BilisumConfig,
        store: Arc<dyn AnalysisStore>,
    ) -> Result<Self, BilisumError> {
        let fetcher = BilibiliClient::new(config.bilibili.clone())?;
        let backend = GeminiClient::new(&config.generation, None)?;
        let generator =
            SummaryGenerator::new(Box::new(backend), PromptLimits::from(&config.generation));

        Ok(Self::new(fetcher, generator, store))
    }

    pub fn store(&self) -> &Arc<dyn AnalysisStore> {
        &self.store
    }

    /// Run one video through the whole pipeline and return the stored record.
    pub async fn analyze(
        &self,
        url: &str,
        session_id: Option<String>,
    ) -> Result<Analysis, BilisumError> {
        tracing::info!(url = %url, "Analyzing video");

        let content = self.fetcher.fetch(url).await?;
        tracing::info!(
            bvid = %content.bvid,
            title = %content.title,
            transcript_chars = content.transcript.chars().count(),
            comments = content.comments.as_ref().map(Vec::len).unwrap_or(0),
            "Fetched video content"
        );

        let summary = self
            .generator
            .summarize(
                &content.title,
                &content.transcript,
                content.comments.as_deref(),
            )
            .await?;

        let analysis = self
            .store
            .create(NewAnalysis {
                url: url.to_string(),
                title: content.title,
                summary,
                original_content: Some(content.transcript),
                session_id,
            })
            .await?;

        Ok(analysis)
    }

    /// Past analyses, newest first.
    pub async fn history(&self, session_id: Option<&str>) -> Result<Vec<Analysis>, BilisumError> {
        Ok(self.store.list(session_id).await?)
    }
}
