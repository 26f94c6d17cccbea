use serde::Serialize;

pub const HOME_WELCOME_BLOCK_ID: &str = "budzy.home.welcome.v1";
pub const HOME_USAGE_BLOCK_ID: &str = "budzy.home.usage.v1";

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TextObject {
    PlainText { text: String },
    Mrkdwn { text: String },
}

impl TextObject {
    pub fn plain(text: impl Into<String>) -> Self {
        Self::PlainText { text: text.into() }
    }

    pub fn mrkdwn(text: impl Into<String>) -> Self {
        Self::Mrkdwn { text: text.into() }
    }

    pub fn text(&self) -> &str {
        match self {
            Self::PlainText { text } | Self::Mrkdwn { text } => text,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    Section { block_id: String, text: TextObject },
}

impl Block {
    pub fn contains_text(&self, needle: &str) -> bool {
        match self {
            Self::Section { text, .. } => text.text().contains(needle),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewType {
    Home,
}

/// A Block Kit surface as accepted by `views.publish`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct View {
    #[serde(rename = "type")]
    pub view_type: ViewType,
    pub blocks: Vec<Block>,
}

pub struct ViewBuilder {
    view_type: ViewType,
    blocks: Vec<Block>,
}

impl ViewBuilder {
    pub fn home() -> Self {
        Self { view_type: ViewType::Home, blocks: Vec::new() }
    }

    pub fn section<F>(mut self, block_id: impl Into<String>, build: F) -> Self
    where
        F: FnOnce(&mut SectionBuilder),
    {
        let mut builder = SectionBuilder::default();
        build(&mut builder);
        self.blocks.push(Block::Section { block_id: block_id.into(), text: builder.build() });
        self
    }

    pub fn build(self) -> View {
        View { view_type: self.view_type, blocks: self.blocks }
    }
}

#[derive(Default)]
pub struct SectionBuilder {
    text: Option<TextObject>,
}

impl SectionBuilder {
    pub fn plain(&mut self, text: impl Into<String>) -> &mut Self {
        self.text = Some(TextObject::plain(text));
        self
    }

    pub fn mrkdwn(&mut self, text: impl Into<String>) -> &mut Self {
        self.text = Some(TextObject::mrkdwn(text));
        self
    }

    fn build(self) -> TextObject {
        self.text.unwrap_or_else(|| TextObject::plain(""))
    }
}

/// Home tab shown to every user who opens the app.
pub fn home_view() -> View {
    ViewBuilder::home()
        .section(HOME_WELCOME_BLOCK_ID, |section| {
            section.mrkdwn("*Welcome to Budzy Onboarding Bot* 🎉");
        })
        .section(HOME_USAGE_BLOCK_ID, |section| {
            section.mrkdwn("Use `/onboard` in a channel to welcome new teammates.");
        })
        .build()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{home_view, Block, TextObject, ViewBuilder, ViewType, HOME_WELCOME_BLOCK_ID};

    #[test]
    fn view_builder_creates_typed_block_structure() {
        let view = ViewBuilder::home()
            .section("budzy.test.section.v1", |section| {
                section.mrkdwn("*Heading*");
            })
            .section("budzy.test.plain.v1", |section| {
                section.plain("footnote");
            })
            .build();

        assert_eq!(view.view_type, ViewType::Home);
        assert_eq!(view.blocks.len(), 2);
        assert!(matches!(
            &view.blocks[0],
            Block::Section { block_id, text: TextObject::Mrkdwn { .. } }
                if block_id == "budzy.test.section.v1"
        ));
        assert!(matches!(
            &view.blocks[1],
            Block::Section { text: TextObject::PlainText { text }, .. } if text == "footnote"
        ));
    }

    #[test]
    fn home_view_names_the_bot_and_the_command() {
        let view = home_view();

        assert_eq!(view.view_type, ViewType::Home);
        assert!(view.blocks.len() >= 2);
        assert!(view.blocks[0].contains_text("Budzy Onboarding Bot"));
        assert!(view.blocks.iter().any(|block| block.contains_text("/onboard")));
    }

    #[test]
    fn home_view_serializes_to_block_kit_shape() {
        let value = serde_json::to_value(home_view()).expect("view should serialize");

        assert_eq!(value["type"], "home");
        assert_eq!(
            value["blocks"][0],
            json!({
                "type": "section",
                "block_id": HOME_WELCOME_BLOCK_ID,
                "text": { "type": "mrkdwn", "text": "*Welcome to Budzy Onboarding Bot* 🎉" }
            })
        );
        assert_eq!(value["blocks"][1]["text"]["type"], "mrkdwn");
    }

    #[test]
    fn empty_section_falls_back_to_plain_text() {
        let view = ViewBuilder::home().section("budzy.test.empty.v1", |_| {}).build();

        assert!(matches!(
            &view.blocks[0],
            Block::Section { text: TextObject::PlainText { text }, .. } if text.is_empty()
        ));
    }
}
