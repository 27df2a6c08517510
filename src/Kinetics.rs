/// eng
/// Rate laws of the iodide-iodate test reaction system used for micromixing
/// measurements. The module takes the instantaneous species fluxes and the
/// instantaneous incorporation volume and produces the three elementary
/// reaction rates together with the ionic-strength-dependent rate constant
/// of the Dushman reaction.
/// ----------------------------------------------------------------
/// ru
/// Кинетика системы йодид-йодатной тестовой реакции, применяемой для
/// измерения микросмешения. Модуль берет на вход мгновенные потоки веществ
/// и мгновенный объем инкорпорации, а затем выдает скорости трех
/// элементарных реакций и константу скорости реакции Душмана, зависящую
/// от ионной силы.
pub mod iodide_iodate;
