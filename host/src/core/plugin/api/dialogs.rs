//! Modal dialogs
//!
//! Extensions await user input through a [`DialogPresenter`] supplied by the
//! embedding UI. Without one, dialogs resolve as cancelled.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Options for a single-line input dialog
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputDialogOptions {
    pub title: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub placeholder: Option<String>,
    #[serde(default)]
    pub default_value: Option<String>,
    #[serde(default)]
    pub ok_label: Option<String>,
}

impl InputDialogOptions {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }
}

/// Renders modal dialogs and resolves them with the user's answer
#[async_trait(?Send)]
pub trait DialogPresenter {
    /// `None` when the user cancels
    async fn input(&self, options: &InputDialogOptions) -> Option<String>;

    async fn confirm(&self, title: &str, message: &str) -> bool;
}

/// Shared slot for the presenter
#[derive(Clone, Default)]
pub struct Dialogs {
    presenter: Rc<RefCell<Option<Rc<dyn DialogPresenter>>>>,
}

impl Dialogs {
    pub fn set_presenter(&self, presenter: Rc<dyn DialogPresenter>) {
        *self.presenter.borrow_mut() = Some(presenter);
    }

    pub async fn input(&self, options: InputDialogOptions) -> Option<String> {
        let presenter = self.presenter.borrow().clone();
        match presenter {
            Some(p) => p.input(&options).await,
            None => {
                tracing::debug!("Input dialog '{}' dismissed: no presenter", options.title);
                None
            }
        }
    }

    pub async fn confirm(&self, title: &str, message: &str) -> bool {
        let presenter = self.presenter.borrow().clone();
        match presenter {
            Some(p) => p.confirm(title, message).await,
            None => false,
        }
    }
}

impl std::fmt::Debug for Dialogs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dialogs")
            .field("presenter", &self.presenter.borrow().is_some())
            .finish()
    }
}

/// Presenter that answers from a fixed queue; used by headless drivers
#[derive(Debug, Default)]
pub struct ScriptedDialogs {
    answers: RefCell<VecDeque<Option<String>>>,
}

impl ScriptedDialogs {
    pub fn new(answers: impl IntoIterator<Item = Option<String>>) -> Self {
        Self {
            answers: RefCell::new(answers.into_iter().collect()),
        }
    }
}

#[async_trait(?Send)]
impl DialogPresenter for ScriptedDialogs {
    async fn input(&self, options: &InputDialogOptions) -> Option<String> {
        self.answers
            .borrow_mut()
            .pop_front()
            .flatten()
            .or_else(|| options.default_value.clone())
    }

    async fn confirm(&self, _title: &str, _message: &str) -> bool {
        matches!(
            self.answers.borrow_mut().pop_front(),
            Some(Some(answer)) if answer.eq_ignore_ascii_case("y") || answer.eq_ignore_ascii_case("yes")
        )
    }
}
