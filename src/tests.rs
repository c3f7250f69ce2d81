/// End-to-end scenarios: props driving a shell, render binding and observers
use crate::{
    ActionKey, AsAnyProp, DebouncedProp, FutureProp, ObservationRegistry, PaginatedProp,
    Placeholder, PropState, RenderOptions, Shell, SyncProp, ViewState, ViewStateKind,
    render_view_state,
};
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;
use tokio::task::LocalSet;
use tokio::time::sleep;

const DELETE: ActionKey = ActionKey::new("delete");

// A dialog service as the rendering layer would provide it while mounted
#[derive(Clone)]
struct Dialogs {
    confirm_answer: bool,
}

impl Dialogs {
    async fn confirm(self, _question: &'static str) -> bool {
        self.confirm_answer
    }
}

// A typical controller: one fetched prop, one local prop, one shell
struct ProfileController {
    user: FutureProp<String>,
    filter: SyncProp<String>,
    shell: Shell<Dialogs>,
}

impl ProfileController {
    fn new(fetch_delay: Duration, result: Result<&'static str, &'static str>) -> Self {
        let user = FutureProp::new(async move {
            sleep(fetch_delay).await;
            result
                .map(str::to_owned)
                .map_err(|message| anyhow::anyhow!(message))
        });
        let filter = SyncProp::new(String::new());
        let shell = Shell::new(vec![user.as_any_prop(), filter.as_any_prop()]);
        Self {
            user,
            filter,
            shell,
        }
    }

    async fn delete_account(&self) -> Result<bool, crate::Error> {
        let confirmed = self
            .shell
            .shell_run(DELETE, |dialogs| dialogs.confirm("Delete account?"))
            .await?;
        Ok(confirmed.unwrap_or(false))
    }
}

#[derive(Debug, PartialEq)]
enum Screen {
    Profile(String),
    Spinner,
    Failure(String),
}

impl From<Placeholder> for Screen {
    fn from(placeholder: Placeholder) -> Self {
        match placeholder {
            Placeholder::Loading => Screen::Spinner,
            Placeholder::Error { message } => Screen::Failure(message),
        }
    }
}

fn draw(controller: &ProfileController) -> Screen {
    render_view_state(&controller.shell.state(), &RenderOptions::new(), || {
        Screen::Profile(controller.user.require().unwrap_or_default())
    })
}

fn counter() -> (Rc<Cell<usize>>, impl Fn() + 'static) {
    let count = Rc::new(Cell::new(0));
    let count_clone = count.clone();
    (count, move || count_clone.set(count_clone.get() + 1))
}

#[tokio::test(start_paused = true)]
async fn fetch_moves_shell_from_pending_to_valid_with_one_notification() {
    LocalSet::new()
        .run_until(async {
            let controller = ProfileController::new(Duration::from_millis(100), Ok("ada"));
            let (notified, on_change) = counter();
            controller.shell.subscribe(on_change);

            assert_eq!(controller.user.state(), PropState::Loading);
            assert_eq!(draw(&controller), Screen::Spinner);

            sleep(Duration::from_millis(150)).await;

            assert_eq!(controller.shell.kind(), ViewStateKind::Valid);
            assert_eq!(notified.get(), 1);
            assert_eq!(draw(&controller), Screen::Profile("ada".into()));

            // Inner mutations that keep the kind do not reach the shell's observers.
            controller.filter.set("admins".into());
            assert_eq!(notified.get(), 1);
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn failed_fetch_wins_over_loading_props() {
    LocalSet::new()
        .run_until(async {
            let failing = FutureProp::<u32>::new(async {
                sleep(Duration::from_millis(10)).await;
                Err(anyhow::anyhow!("quota exceeded"))
            });
            let slow = FutureProp::<u32>::new(async {
                sleep(Duration::from_secs(10)).await;
                Ok::<_, anyhow::Error>(1)
            });
            let shell: Shell = Shell::new(vec![slow.as_any_prop(), failing.as_any_prop()]);

            sleep(Duration::from_millis(20)).await;

            assert_eq!(slow.state(), PropState::Loading);
            let state = shell.state();
            let errors = state.errors().unwrap();
            assert_eq!(errors.len(), 1);
            assert_eq!(errors[&failing.id()].to_string(), "quota exceeded");

            let screen: Screen = render_view_state(&state, &RenderOptions::new(), || {
                Screen::Profile(String::new())
            });
            assert_eq!(
                screen,
                Screen::Failure(crate::DEFAULT_ERROR_MESSAGE.to_owned())
            );

            failing.refresh(async { Ok::<_, anyhow::Error>(2) });
            assert!(shell.state().is_pending());
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn fine_grained_observer_rebuilds_without_shell_notification() {
    LocalSet::new()
        .run_until(async {
            let controller = ProfileController::new(Duration::ZERO, Ok("grace"));
            sleep(Duration::from_millis(1)).await;
            assert!(controller.shell.state().is_valid());

            let (shell_notified, on_shell_change) = counter();
            controller.shell.subscribe(on_shell_change);

            let registry = ObservationRegistry::new();
            let rebuilt = Rc::new(RefCell::new(Vec::new()));
            let filter_view = {
                let rebuilt = rebuilt.clone();
                registry.register_observer(move || rebuilt.borrow_mut().push("filter"))
            };
            let name_view = {
                let rebuilt = rebuilt.clone();
                registry.register_observer(move || rebuilt.borrow_mut().push("name"))
            };

            {
                let scope = registry.render();
                let filter = scope
                    .select(&filter_view, &controller, |c| &c.filter)
                    .unwrap();
                assert_eq!(filter.get(), "");
                scope.select(&name_view, &controller, |c| &c.user).unwrap();
            }

            controller.filter.set("staff".into());

            assert_eq!(*rebuilt.borrow(), vec!["filter"]);
            assert_eq!(registry.take_dirty(), vec![filter_view.id()]);
            assert_eq!(shell_notified.get(), 0);
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn search_box_burst_settles_once() {
    LocalSet::new()
        .run_until(async {
            let results = DebouncedProp::<Vec<String>>::with_delay(Duration::from_millis(300));
            let shell: Shell = Shell::new(vec![results.as_any_prop()]);
            let (notified, on_change) = counter();
            shell.subscribe(on_change);
            let searches = Rc::new(RefCell::new(Vec::new()));

            for query in ["r", "ru", "rus"] {
                let searches = searches.clone();
                results.debounce(move || async move {
                    searches.borrow_mut().push(query);
                    Ok::<_, anyhow::Error>(vec![format!("{query}t")])
                });
                sleep(Duration::from_millis(100)).await;
            }
            assert!(searches.borrow().is_empty());

            sleep(Duration::from_millis(400)).await;

            assert_eq!(*searches.borrow(), vec!["rus"]);
            assert_eq!(results.value(), Some(vec!["rust".to_owned()]));
            assert!(shell.state().is_valid());
            assert_eq!(notified.get(), 1);
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn paging_keeps_stale_page_visible_while_loading() {
    LocalSet::new()
        .run_until(async {
            let pages = PaginatedProp::new(1, |page: u32| async move {
                sleep(Duration::from_millis(50)).await;
                Ok::<_, anyhow::Error>(vec![page * 10, page * 10 + 1])
            });
            let shell: Shell = Shell::new(vec![pages.as_any_prop()]);

            pages.fetch_initial_page().await;
            assert!(shell.state().is_valid());

            let next = pages.fetch_next_page();
            futures::pin_mut!(next);
            assert!(futures::poll!(next.as_mut()).is_pending());

            let state = shell.state();
            assert!(matches!(state, ViewState::Pending { .. }));
            assert_eq!(state.stale_data::<Vec<u32>>(), Some(&vec![10, 11]));

            next.await;
            assert_eq!(pages.current_page(), 2);
            assert_eq!(pages.value(), Some(vec![20, 21]));
            assert!(shell.state().is_valid());
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn confirmation_dialog_is_driven_from_the_test() {
    LocalSet::new()
        .run_until(async {
            let controller = ProfileController::new(Duration::ZERO, Ok("ada"));

            // Unmounted: the action is skipped.
            assert_eq!(controller.delete_account().await, Ok(false));

            // Mounted: the live dialog answers.
            controller.shell.attach(|| {
                Some(Dialogs {
                    confirm_answer: true,
                })
            });
            assert_eq!(controller.delete_account().await, Ok(true));

            // Faked: the test answers.
            controller.shell.fake_shell();
            let pending = controller.delete_account();
            futures::pin_mut!(pending);
            assert!(futures::poll!(pending.as_mut()).is_pending());
            assert!(controller.shell.has_pending_action(DELETE));

            controller
                .shell
                .shell_return_for_action(DELETE, false)
                .unwrap();
            assert_eq!(pending.await, Ok(false));
            assert!(!controller.shell.has_pending_action(DELETE));
        })
        .await;
}
